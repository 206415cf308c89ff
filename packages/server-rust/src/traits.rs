use async_trait::async_trait;
use bson::Document;
use quarry_core::compile::document::DocumentQuery;
use quarry_core::compile::sql::SqlStatement;
use quarry_core::tabular::{CellValue, TableDefinition};
use quarry_core::Row;
use serde::Serialize;

/// Schemaless collection store.
/// Implementations: `MongoDB`, memory (tests).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Union of top-level keys over a random sample of up to `sample_size`
    /// documents. Empty when the sample yields nothing.
    async fn sample_field_names(
        &self,
        collection: &str,
        sample_size: u32,
    ) -> anyhow::Result<Vec<String>>;

    /// Any one document of the collection.
    async fn find_one(&self, collection: &str) -> anyhow::Result<Option<Document>>;

    /// Number of documents matching `filter`.
    async fn count(&self, collection: &str, filter: &Document) -> anyhow::Result<u64>;

    /// Documents matching the query's filter, sorted and windowed. An empty
    /// sort document means natural order.
    async fn find(&self, collection: &str, query: &DocumentQuery) -> anyhow::Result<Vec<Document>>;

    /// Names of all collections, including system ones.
    async fn list_collections(&self) -> anyhow::Result<Vec<String>>;

    /// Inserts documents, returning how many were written.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> anyhow::Result<u64>;

    /// Storage footprint of the collection, if the store reports one.
    async fn storage_stats(&self, collection: &str) -> anyhow::Result<StorageStats>;

    /// Indexes defined on the collection.
    async fn list_indexes(&self, collection: &str) -> anyhow::Result<Vec<IndexInfo>>;

    /// Creates a single-field index; `direction` is `1` or `-1`. Returns
    /// the index name.
    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        direction: i32,
    ) -> anyhow::Result<String>;

    /// Round-trip to the server.
    async fn ping(&self) -> anyhow::Result<()>;
}

/// Typed table store.
/// Implementations: `PostgreSQL`, recording fake (tests).
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Checks out one pooled connection. Dropping the session returns it.
    async fn acquire(&self) -> anyhow::Result<Box<dyn RelationalSession>>;

    /// Base tables of the configured schema.
    async fn list_tables(&self) -> anyhow::Result<Vec<String>>;

    /// Creates the table if needed and inserts every row in one
    /// transaction. Returns the number of rows written.
    async fn create_and_insert(
        &self,
        table: &TableDefinition,
        rows: &[Vec<CellValue>],
    ) -> anyhow::Result<u64>;

    /// Round-trip to the server.
    async fn ping(&self) -> anyhow::Result<()>;
}

/// One checked-out connection. Every query a request runs goes through the
/// same session.
#[async_trait]
pub trait RelationalSession: Send {
    /// Columns of `table` in ordinal order. Empty when the table does not
    /// exist.
    async fn columns(&mut self, table: &str) -> anyhow::Result<Vec<CatalogColumn>>;

    /// Runs a `SELECT COUNT(*)` statement.
    async fn count(&mut self, statement: &SqlStatement) -> anyhow::Result<u64>;

    /// Runs a row-returning statement and decodes every row.
    async fn fetch(&mut self, statement: &SqlStatement) -> anyhow::Result<Vec<Row>>;
}

/// Catalog entry for one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    /// Column name.
    pub name: String,
    /// `information_schema.columns.data_type`.
    pub data_type: String,
}

/// Collection size figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub size_bytes: i64,
    pub storage_size_bytes: i64,
    pub avg_doc_size: i64,
}

/// One index definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexInfo {
    pub name: Option<String>,
    pub key: serde_json::Value,
    pub unique: bool,
    pub sparse: bool,
}
