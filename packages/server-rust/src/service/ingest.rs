//! CSV and Excel ingestion into both stores.
//!
//! The two writes are independent: a failure in one store is reported next
//! to the success of the other, never rolled back across stores.

use std::sync::Arc;

use quarry_core::tabular::{derive_names, TabularData};
use quarry_core::{FileFormat, QueryError, StoreKind, TableDefinition};
use serde::Serialize;
use tracing::{error, info};

use crate::traits::{DocumentStore, RelationalStore};

/// Caller-chosen targets and store selection for one upload.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub table_name: Option<String>,
    pub collection_name: Option<String>,
    /// Write to the document store only.
    pub document_only: bool,
    /// Write to the relational store only.
    pub relational_only: bool,
}

impl UploadOptions {
    fn writes_documents(&self) -> bool {
        !self.relational_only
    }

    fn writes_relational(&self) -> bool {
        !self.document_only
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Every requested store was written.
    Success,
    /// At least one store was written, at least one failed.
    PartialSuccess,
    /// Nothing was written.
    Failure,
}

/// Outcome of one upload, per store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub message: String,
    pub rows: usize,
    pub columns: usize,
    pub table_name: String,
    pub collection_name: String,
    pub document_success: bool,
    pub relational_success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relational_error: Option<String>,
    pub status: UploadStatus,
}

/// Decodes uploaded files and writes them to the configured stores.
pub struct IngestService {
    documents: Arc<dyn DocumentStore>,
    relational: Arc<dyn RelationalStore>,
}

/// Checks the filename and option combination before any decoding and
/// picks the decoder.
///
/// # Errors
///
/// Returns [`QueryError::Validation`] for a missing name, an unsupported
/// extension or both `*_only` flags set.
pub fn validate_upload(filename: &str, options: &UploadOptions) -> Result<FileFormat, QueryError> {
    if filename.trim().is_empty() {
        return Err(QueryError::validation("No file uploaded"));
    }
    let format = FileFormat::from_filename(filename)
        .ok_or_else(|| QueryError::validation("Only CSV and Excel files are supported"))?;
    if options.document_only && options.relational_only {
        return Err(QueryError::validation(
            "Cannot specify both document_only and relational_only",
        ));
    }
    Ok(format)
}

impl IngestService {
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentStore>, relational: Arc<dyn RelationalStore>) -> Self {
        Self {
            documents,
            relational,
        }
    }

    /// Decodes `bytes` and writes the rows to the selected stores.
    ///
    /// Store failures are captured in the report; its `status` tells the
    /// caller whether anything was written.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Validation`] when the upload is rejected before
    /// any write: bad filename or options, undecodable or empty file.
    pub async fn upload(
        &self,
        filename: &str,
        bytes: &[u8],
        options: &UploadOptions,
    ) -> Result<UploadReport, QueryError> {
        let format = validate_upload(filename, options)?;

        let data = format.decode(bytes)?;
        if data.is_empty() {
            return Err(QueryError::validation("Uploaded file is empty"));
        }
        info!(
            file = filename,
            rows = data.row_count(),
            columns = data.columns.len(),
            "parsed upload"
        );

        let unix_secs = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        let names = derive_names(
            filename,
            options.table_name.as_deref(),
            options.collection_name.as_deref(),
            unix_secs,
        );
        let definition = TableDefinition::infer(names.table.clone(), &data);

        let mut report = UploadReport {
            message: "Data processed successfully".to_string(),
            rows: data.row_count(),
            columns: data.columns.len(),
            table_name: names.table,
            collection_name: names.collection,
            document_success: false,
            relational_success: false,
            document_error: None,
            relational_error: None,
            status: UploadStatus::Failure,
        };

        if options.writes_documents() {
            match self.write_documents(&report.collection_name, &definition, &data).await {
                Ok(()) => report.document_success = true,
                Err(err) => report.document_error = Some(err.to_string()),
            }
        }
        if options.writes_relational() {
            match self.write_table(&definition, &data).await {
                Ok(()) => report.relational_success = true,
                Err(err) => report.relational_error = Some(err.to_string()),
            }
        }

        report.status = status(options, report.document_success, report.relational_success);
        if report.status == UploadStatus::Failure {
            report.message = "Failed to insert data to specified databases".to_string();
        }
        Ok(report)
    }

    async fn write_documents(
        &self,
        collection: &str,
        definition: &TableDefinition,
        data: &TabularData,
    ) -> Result<(), QueryError> {
        let written = self
            .documents
            .insert_many(collection, definition.documents(data))
            .await
            .map_err(|source| {
                error!(store = "mongodb", target = collection, error = ?source, "document insert failed");
                QueryError::execution(StoreKind::Document, collection, "insert documents into", source)
            })?;
        info!(collection, written, "documents inserted");
        Ok(())
    }

    async fn write_table(
        &self,
        definition: &TableDefinition,
        data: &TabularData,
    ) -> Result<(), QueryError> {
        let table = definition.name.as_str();
        let written = self
            .relational
            .create_and_insert(definition, &definition.typed_rows(data))
            .await
            .map_err(|source| {
                error!(store = "postgres", target = table, error = ?source, "table insert failed");
                QueryError::execution(StoreKind::Relational, table, "insert rows into", source)
            })?;
        info!(table, written, "rows inserted");
        Ok(())
    }
}

fn status(options: &UploadOptions, document_success: bool, relational_success: bool) -> UploadStatus {
    let document_ok = !options.writes_documents() || document_success;
    let relational_ok = !options.writes_relational() || relational_success;
    if document_ok && relational_ok {
        UploadStatus::Success
    } else if document_success || relational_success {
        UploadStatus::PartialSuccess
    } else {
        UploadStatus::Failure
    }
}
