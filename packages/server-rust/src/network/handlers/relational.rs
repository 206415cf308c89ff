//! `/api/postgres` handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use quarry_core::{PageResult, QueryRequest};

use super::params::{json_request, QueryParams};
use super::{ApiError, AppState};
use crate::service::relational::TableStats;

pub async fn list_tables(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.relational.list_tables().await?))
}

pub async fn query_table(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<QueryParams>,
) -> Result<Json<PageResult>, ApiError> {
    let request = params.into_request()?;
    Ok(Json(state.relational.query_table(&table, &request).await?))
}

pub async fn query_table_json(
    State(state): State<AppState>,
    Path(table): Path<String>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<PageResult>, ApiError> {
    let request = json_request(body)?;
    Ok(Json(state.relational.query_table(&table, &request).await?))
}

pub async fn table_stats(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<Json<TableStats>, ApiError> {
    Ok(Json(state.relational.table_stats(&table).await?))
}
