//! `/api/mongodb` handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use quarry_core::{PageResult, QueryError, QueryRequest, SortOrder};
use serde::Deserialize;
use serde_json::{json, Value};

use super::params::{json_request, QueryParams};
use super::{ApiError, AppState};
use crate::service::document::CollectionStats;

pub async fn list_collections(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.documents.list_collections().await?))
}

pub async fn query_collection(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<QueryParams>,
) -> Result<Json<PageResult>, ApiError> {
    let request = params.into_request()?;
    Ok(Json(state.documents.query_collection(&collection, &request).await?))
}

pub async fn query_collection_json(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<PageResult>, ApiError> {
    let request = json_request(body)?;
    Ok(Json(state.documents.query_collection(&collection, &request).await?))
}

pub async fn collection_stats(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> Result<Json<CollectionStats>, ApiError> {
    Ok(Json(state.documents.collection_stats(&collection).await?))
}

pub async fn list_indexes(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let indexes = state.documents.list_indexes(&collection).await?;
    Ok(Json(json!({
        "collection_name": collection,
        "indexes": indexes,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateIndexParams {
    #[serde(default)]
    pub field: String,
    #[serde(default = "default_index_type")]
    pub index_type: String,
}

fn default_index_type() -> String {
    "ascending".to_string()
}

fn index_order(index_type: &str) -> Result<SortOrder, QueryError> {
    match index_type {
        "ascending" => Ok(SortOrder::Asc),
        "descending" => Ok(SortOrder::Desc),
        other => Err(QueryError::validation(format!(
            "index_type must be 'ascending' or 'descending', got '{other}'"
        ))),
    }
}

pub async fn create_index(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<CreateIndexParams>,
) -> Result<Json<Value>, ApiError> {
    let order = index_order(&params.index_type)?;
    let name = state
        .documents
        .create_index(&collection, &params.field, order)
        .await?;
    Ok(Json(json!({
        "message": format!(
            "Index created successfully on field '{}' in collection '{collection}'",
            params.field.trim()
        ),
        "index_name": name,
    })))
}
