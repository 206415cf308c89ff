//! Backend-agnostic query request.
//!
//! Field names follow the wire format of the HTTP API (`snake_case`), so the
//! same struct is used as the JSON body of the `query-json` endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::QueryError;

/// Largest page size a caller may request.
pub const MAX_LIMIT: u32 = 1000;

/// Page size used when the caller does not specify one.
pub const DEFAULT_LIMIT: u32 = 10;

/// Sort direction requested by the caller.
///
/// Both the query string and the JSON body go through [`SortOrder::parse`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum SortOrder {
    /// Ascending order (smallest first).
    #[default]
    Asc,
    /// Descending order (largest first).
    Desc,
}

impl SortOrder {
    /// Parses a caller-supplied direction. Only `asc` and `desc` are accepted,
    /// compared case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Validation`] for any other value.
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        if raw.eq_ignore_ascii_case("asc") {
            Ok(Self::Asc)
        } else if raw.eq_ignore_ascii_case("desc") {
            Ok(Self::Desc)
        } else {
            Err(QueryError::validation(format!(
                "sort_order must be 'asc' or 'desc', got '{raw}'"
            )))
        }
    }

    /// SQL keyword for this direction.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Document-store sort value (`1` / `-1`).
    #[must_use]
    pub fn as_document_direction(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }
}

impl TryFrom<String> for SortOrder {
    type Error = QueryError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

/// A single paginated query against one collection or table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    /// 1-indexed page number.
    pub page: u32,
    /// Rows per page, `1..=MAX_LIMIT`.
    pub limit: u32,
    /// Free-text search term. Blank terms are ignored.
    pub search: Option<String>,
    /// Restricts search to these fields when present.
    pub search_columns: Option<Vec<String>>,
    /// Field name to scalar literal (equality) or operator mapping.
    pub filters: Option<Map<String, Value>>,
    /// Field to order by.
    pub sort_by: Option<String>,
    /// Sort direction, ascending unless stated otherwise.
    pub sort_order: SortOrder,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
            search: None,
            search_columns: None,
            filters: None,
            sort_by: None,
            sort_order: SortOrder::Asc,
        }
    }
}

impl QueryRequest {
    /// Checks the request shape: page and limit ranges.
    ///
    /// Field references inside `filters`, `search_columns` and `sort_by` are
    /// not checked here; unknown names are dropped during planning.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Validation`] when `page < 1` or `limit` is
    /// outside `1..=MAX_LIMIT`.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.page < 1 {
            return Err(QueryError::validation("page must be greater than or equal to 1"));
        }
        if self.limit < 1 || self.limit > MAX_LIMIT {
            return Err(QueryError::validation(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        Ok(())
    }

    /// Trimmed search term, or `None` when absent or blank.
    #[must_use]
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }

    /// Number of rows skipped before the requested page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// Splits a comma-separated column list as sent in query strings.
///
/// Entries are trimmed and empty entries dropped. Returns `None` when nothing
/// remains, which means "search every field".
#[must_use]
pub fn parse_column_list(raw: &str) -> Option<Vec<String>> {
    let columns: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    if columns.is_empty() {
        None
    } else {
        Some(columns)
    }
}

/// Parses the JSON text of a query-string `filters` parameter.
///
/// # Errors
///
/// Returns [`QueryError::Validation`] when the text is not valid JSON or is
/// not a JSON object.
pub fn parse_filters(raw: &str) -> Result<Map<String, Value>, QueryError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(QueryError::validation("filters must be a JSON object")),
        Err(_) => Err(QueryError::validation(
            "Invalid JSON format for filters parameter",
        )),
    }
}
