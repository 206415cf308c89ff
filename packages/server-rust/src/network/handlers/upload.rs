//! `POST /api/upload`: multipart CSV or Excel ingestion.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::{ApiError, AppState};
use crate::service::{UploadOptions, UploadReport, UploadStatus};

const FILE_FIELD: &str = "file";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UploadParams {
    pub table_name: Option<String>,
    pub collection_name: Option<String>,
    pub document_only: bool,
    pub relational_only: bool,
}

impl From<UploadParams> for UploadOptions {
    fn from(params: UploadParams) -> Self {
        Self {
            table_name: params.table_name,
            collection_name: params.collection_name,
            document_only: params.document_only,
            relational_only: params.relational_only,
        }
    }
}

fn status_code(status: UploadStatus) -> StatusCode {
    match status {
        UploadStatus::Success => StatusCode::OK,
        UploadStatus::PartialSuccess => StatusCode::MULTI_STATUS,
        UploadStatus::Failure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Reads the `file` part; other parts are skipped.
async fn read_file(mut multipart: Multipart) -> Result<(String, Vec<u8>), ApiError> {
    let bad_part = |e: axum::extract::multipart::MultipartError| ApiError::BadRequest(e.body_text());
    while let Some(field) = multipart.next_field().await.map_err(bad_part)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(bad_part)?;
        return Ok((filename, bytes.to_vec()));
    }
    Err(ApiError::BadRequest("No file uploaded".to_string()))
}

pub async fn upload_file(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadReport>), ApiError> {
    let multipart = multipart.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let (filename, bytes) = read_file(multipart).await?;

    let report = state
        .ingest
        .upload(&filename, &bytes, &params.into())
        .await?;
    Ok((status_code(report.status), Json(report)))
}
