//! Relational fake for tests: canned catalog and rows, recorded statements
//! and session accounting.
//!
//! Predicates are not evaluated; `count` reports every row of the table and
//! `fetch` only applies the bound `LIMIT`/`OFFSET`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use quarry_core::compile::sql::{quote_identifier, SqlParam, SqlStatement};
use quarry_core::tabular::{CellValue, TableDefinition};
use quarry_core::Row;

use crate::traits::{CatalogColumn, RelationalSession, RelationalStore};

#[derive(Debug, Clone, Default)]
struct FakeTable {
    columns: Vec<CatalogColumn>,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<HashMap<String, FakeTable>>,
    statements: Mutex<Vec<SqlStatement>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    fail_fetch: AtomicBool,
    fail_insert: AtomicBool,
}

/// Records everything the services ask of the relational store.
#[derive(Debug, Clone, Default)]
pub struct RecordingRelationalStore {
    shared: Arc<Shared>,
}

impl RecordingRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table with `(name, data_type)` columns and its rows.
    pub fn with_table(self, name: &str, columns: &[(&str, &str)], rows: Vec<Row>) -> Self {
        let table = FakeTable {
            columns: columns
                .iter()
                .map(|(name, data_type)| CatalogColumn {
                    name: (*name).to_string(),
                    data_type: (*data_type).to_string(),
                })
                .collect(),
            rows,
        };
        self.shared.tables.lock().insert(name.to_string(), table);
        self
    }

    /// Makes every `fetch` fail.
    pub fn failing_fetch(self) -> Self {
        self.shared.fail_fetch.store(true, Ordering::SeqCst);
        self
    }

    /// Makes `create_and_insert` fail.
    pub fn failing_insert(self) -> Self {
        self.shared.fail_insert.store(true, Ordering::SeqCst);
        self
    }

    pub fn statements(&self) -> Vec<SqlStatement> {
        self.shared.statements.lock().clone()
    }

    pub fn sessions_acquired(&self) -> usize {
        self.shared.acquired.load(Ordering::SeqCst)
    }

    pub fn sessions_released(&self) -> usize {
        self.shared.released.load(Ordering::SeqCst)
    }

    /// Names of the tables known to the fake, with their row counts.
    pub fn table_sizes(&self) -> Vec<(String, usize)> {
        let mut sizes: Vec<(String, usize)> = self
            .shared
            .tables
            .lock()
            .iter()
            .map(|(name, table)| (name.clone(), table.rows.len()))
            .collect();
        sizes.sort();
        sizes
    }
}

struct RecordingSession {
    shared: Arc<Shared>,
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.shared.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl RecordingSession {
    fn table_for(&self, statement: &SqlStatement) -> Option<FakeTable> {
        self.shared
            .tables
            .lock()
            .iter()
            .find(|(name, _)| {
                statement
                    .text
                    .contains(&format!("FROM {}", quote_identifier(name)))
            })
            .map(|(_, table)| table.clone())
    }

    fn record(&self, statement: &SqlStatement) {
        self.shared.statements.lock().push(statement.clone());
    }
}

fn trailing_ints(params: &[SqlParam], n: usize) -> Vec<usize> {
    params
        .iter()
        .rev()
        .take(n)
        .filter_map(|param| match param {
            SqlParam::Int(i) => usize::try_from(*i).ok(),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl RelationalSession for RecordingSession {
    async fn columns(&mut self, table: &str) -> anyhow::Result<Vec<CatalogColumn>> {
        Ok(self
            .shared
            .tables
            .lock()
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn count(&mut self, statement: &SqlStatement) -> anyhow::Result<u64> {
        self.record(statement);
        Ok(self
            .table_for(statement)
            .map_or(0, |table| table.rows.len() as u64))
    }

    async fn fetch(&mut self, statement: &SqlStatement) -> anyhow::Result<Vec<Row>> {
        self.record(statement);
        if self.shared.fail_fetch.load(Ordering::SeqCst) {
            anyhow::bail!("relation does not exist");
        }
        let rows = self.table_for(statement).map(|t| t.rows).unwrap_or_default();

        let (offset, limit) = if statement.text.contains(" OFFSET ") {
            match trailing_ints(&statement.params, 2).as_slice() {
                [offset, limit] => (*offset, *limit),
                _ => (0, usize::MAX),
            }
        } else if statement.text.contains(" LIMIT ") {
            (0, trailing_ints(&statement.params, 1).first().copied().unwrap_or(usize::MAX))
        } else {
            (0, usize::MAX)
        };
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait]
impl RelationalStore for RecordingRelationalStore {
    async fn acquire(&self) -> anyhow::Result<Box<dyn RelationalSession>> {
        self.shared.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingSession {
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn list_tables(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.table_sizes().into_iter().map(|(name, _)| name).collect())
    }

    async fn create_and_insert(
        &self,
        table: &TableDefinition,
        rows: &[Vec<CellValue>],
    ) -> anyhow::Result<u64> {
        if self.shared.fail_insert.load(Ordering::SeqCst) {
            anyhow::bail!("permission denied for schema public");
        }
        let mut tables = self.shared.tables.lock();
        let entry = tables.entry(table.name.clone()).or_default();
        entry.columns = table
            .columns
            .iter()
            .map(|(name, ty)| CatalogColumn {
                name: name.clone(),
                data_type: ty.sql_type().to_lowercase(),
            })
            .collect();
        entry.rows.extend(rows.iter().map(|_| Row::new()));
        Ok(rows.len() as u64)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
