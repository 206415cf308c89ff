//! Query-string and JSON-body forms of a [`QueryRequest`].

use axum::extract::rejection::JsonRejection;
use axum::Json;
use quarry_core::request::{parse_column_list, parse_filters};
use quarry_core::{QueryError, QueryRequest, SortOrder, DEFAULT_LIMIT};
use serde::Deserialize;

use super::ApiError;

/// `GET .../query` parameters. `search_columns` is comma separated and
/// `filters` is JSON text.
#[derive(Debug, Default, Deserialize)]
pub struct QueryParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub search_columns: Option<String>,
    pub filters: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl QueryParams {
    /// Converts and validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Validation`] for unparseable `filters`, an
    /// unknown `sort_order` or out-of-range pagination.
    pub fn into_request(self) -> Result<QueryRequest, QueryError> {
        let filters = match self.filters.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(parse_filters(raw)?),
            _ => None,
        };
        let sort_order = match self.sort_order.as_deref() {
            Some(raw) => SortOrder::parse(raw)?,
            None => SortOrder::Asc,
        };

        let request = QueryRequest {
            page: self.page.unwrap_or(1),
            limit: self.limit.unwrap_or(DEFAULT_LIMIT),
            search: self.search,
            search_columns: self.search_columns.as_deref().and_then(parse_column_list),
            filters,
            sort_by: self.sort_by.filter(|name| !name.trim().is_empty()),
            sort_order,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Unwraps a JSON body, turning any rejection into a 400.
///
/// # Errors
///
/// Returns [`ApiError::BadRequest`] when the body is missing, not JSON, or
/// does not fit a [`QueryRequest`].
pub fn json_request(
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<QueryRequest, ApiError> {
    let Json(request) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    request.validate()?;
    Ok(request)
}
