//! Query service for the relational store.

use std::collections::BTreeMap;
use std::sync::Arc;

use quarry_core::compile::sql::{self, quote_identifier, SqlParam, SqlStatement, IDENTITY_COLUMN};
use quarry_core::sanitize::sanitize_rows;
use quarry_core::{FieldDef, FieldKind, PageResult, QueryError, QueryPlan, QueryRequest, SchemaView, StoreKind};
use serde::Serialize;

use super::config::GatewayConfig;
use super::observe;
use super::stats::{field_stats, FieldStats};
use crate::traits::{RelationalSession, RelationalStore};

const STORE: StoreKind = StoreKind::Relational;

/// Statistics for one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableStats {
    pub table_name: String,
    pub total_rows: u64,
    pub total_columns: usize,
    pub columns: Vec<String>,
    pub column_stats: BTreeMap<String, FieldStats>,
}

/// Pagination, search, filter and sort over `PostgreSQL` tables.
///
/// Every operation checks out one session and runs all of its statements
/// through it. The session goes back to the pool when it drops.
pub struct RelationalQueryService {
    store: Arc<dyn RelationalStore>,
    config: GatewayConfig,
}

impl RelationalQueryService {
    #[must_use]
    pub fn new(store: Arc<dyn RelationalStore>, config: GatewayConfig) -> Self {
        Self { store, config }
    }

    /// Shared store handle.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RelationalStore> {
        &self.store
    }

    fn failed<'a>(target: &'a str, operation: &'static str) -> impl FnOnce(anyhow::Error) -> QueryError + 'a {
        move |source| QueryError::execution(STORE, target, operation, source)
    }

    async fn session(&self, table: &str) -> Result<Box<dyn RelationalSession>, QueryError> {
        self.store
            .acquire()
            .await
            .map_err(Self::failed(table, "acquire a connection for"))
    }

    /// Typed columns of `table` from the catalog, without the surrogate
    /// `id` column.
    async fn discover(
        session: &mut dyn RelationalSession,
        table: &str,
    ) -> Result<SchemaView, QueryError> {
        let columns = session
            .columns(table)
            .await
            .map_err(Self::failed(table, "read columns of"))?;
        let schema = SchemaView::new(
            columns
                .into_iter()
                .filter(|column| column.name != IDENTITY_COLUMN)
                .map(|column| FieldDef {
                    kind: FieldKind::from_sql_type(&column.data_type),
                    name: column.name,
                }),
        );
        if schema.is_empty() {
            return Err(QueryError::not_found(STORE, table));
        }
        Ok(schema)
    }

    /// Runs one paginated query against `table`.
    ///
    /// # Errors
    ///
    /// [`QueryError::Validation`] for a malformed request,
    /// [`QueryError::NotFound`] when the table has no columns,
    /// [`QueryError::Execution`] when the store fails.
    pub async fn query_table(
        &self,
        table: &str,
        request: &QueryRequest,
    ) -> Result<PageResult, QueryError> {
        observe(STORE, table, "query", async {
            request.validate()?;
            let mut session = self.session(table).await?;
            let schema = Self::discover(session.as_mut(), table).await?;
            let plan = QueryPlan::build(request, &schema)?;
            let query = sql::compile_query(table, &plan, &schema);

            let total_count = session
                .count(&query.count)
                .await
                .map_err(Self::failed(table, "count rows in"))?;
            let rows = session
                .fetch(&query.page)
                .await
                .map_err(Self::failed(table, "fetch rows from"))?;

            Ok(PageResult::assemble(
                sanitize_rows(rows),
                total_count,
                &plan.pagination,
            ))
        })
        .await
    }

    /// Row count, columns and per-column statistics over the first rows.
    ///
    /// # Errors
    ///
    /// [`QueryError::NotFound`] when the table has no columns,
    /// [`QueryError::Execution`] when the store fails.
    pub async fn table_stats(&self, table: &str) -> Result<TableStats, QueryError> {
        observe(STORE, table, "stats", async {
            let mut session = self.session(table).await?;
            let schema = Self::discover(session.as_mut(), table).await?;
            let quoted = quote_identifier(table);

            let total_rows = session
                .count(&SqlStatement {
                    text: format!("SELECT COUNT(*) FROM {quoted}"),
                    params: Vec::new(),
                })
                .await
                .map_err(Self::failed(table, "count rows in"))?;
            let rows = session
                .fetch(&SqlStatement {
                    text: format!("SELECT * FROM {quoted} LIMIT $1"),
                    params: vec![SqlParam::Int(i64::from(self.config.stats_sample_size))],
                })
                .await
                .map_err(Self::failed(table, "sample rows from"))?;

            let columns: Vec<String> = schema.names().map(str::to_string).collect();
            Ok(TableStats {
                table_name: table.to_string(),
                total_rows,
                total_columns: columns.len(),
                column_stats: field_stats(schema.names(), &rows),
                columns,
            })
        })
        .await
    }

    /// Base tables of the configured schema.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Execution`] if the store fails.
    pub async fn list_tables(&self) -> Result<Vec<String>, QueryError> {
        self.store
            .list_tables()
            .await
            .map_err(Self::failed("*", "list tables of"))
    }
}
