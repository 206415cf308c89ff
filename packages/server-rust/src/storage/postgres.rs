//! [`RelationalStore`] backed by a `PostgreSQL` connection pool.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use quarry_core::compile::sql::{SqlParam, SqlStatement};
use quarry_core::tabular::{CellValue, ColumnType, TableDefinition};
use quarry_core::Row;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::query_builder::Separated;
use sqlx::{Arguments, Column, Postgres, QueryBuilder, Row as _, TypeInfo, ValueRef};
use tracing::{debug, info};
use uuid::Uuid;

use crate::service::config::PostgresConfig;
use crate::traits::{CatalogColumn, RelationalSession, RelationalStore};

/// Upper bound on bind parameters in one statement.
const MAX_BIND_PARAMS: usize = 65_535;

/// Pooled `PostgreSQL` access.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    schema: String,
}

impl PostgresStore {
    /// Builds a lazily connecting pool. Every connection runs with JIT off
    /// and the configured statement timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection URL cannot be parsed.
    pub fn connect_lazy(config: &PostgresConfig) -> anyhow::Result<Self> {
        let statement_timeout = config.statement_timeout.as_millis().to_string();
        let options: PgConnectOptions = config.url.parse()?;
        let options = options.options([
            ("jit", "off"),
            ("statement_timeout", statement_timeout.as_str()),
        ]);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy_with(options);

        info!(
            schema = %config.schema,
            max_connections = config.max_connections,
            "PostgreSQL pool configured"
        );
        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }
}

#[async_trait]
impl RelationalStore for PostgresStore {
    async fn acquire(&self) -> anyhow::Result<Box<dyn RelationalSession>> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PostgresSession {
            conn,
            schema: self.schema.clone(),
        }))
    }

    async fn list_tables(&self) -> anyhow::Result<Vec<String>> {
        let tables = sqlx::query_scalar::<_, String>(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = $1 AND table_type = 'BASE TABLE' ORDER BY table_name",
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }

    async fn create_and_insert(
        &self,
        table: &TableDefinition,
        rows: &[Vec<CellValue>],
    ) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&table.create_statement())
            .execute(&mut *tx)
            .await?;

        for chunk in rows.chunks(rows_per_statement(table.columns.len())) {
            let mut builder = insert_statement(table, chunk);
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        debug!(table = %table.name, rows = rows.len(), "rows inserted");
        Ok(rows.len() as u64)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

/// Multi-row `INSERT` for one chunk of rows.
fn insert_statement(table: &TableDefinition, rows: &[Vec<CellValue>]) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(table.insert_prefix());
    builder.push_values(rows, |mut values, row| {
        for (cell, (_, ty)) in row.iter().zip(&table.columns) {
            push_cell(&mut values, cell, *ty);
        }
    });
    builder
}

/// Binds one cell; empty cells become a `NULL` of the column's type.
fn push_cell(
    values: &mut Separated<'_, 'static, Postgres, &'static str>,
    cell: &CellValue,
    ty: ColumnType,
) {
    match cell {
        CellValue::Null => match ty {
            ColumnType::BigInt => values.push_bind(None::<i64>),
            ColumnType::DoublePrecision => values.push_bind(None::<f64>),
            ColumnType::Boolean => values.push_bind(None::<bool>),
            ColumnType::Timestamp => values.push_bind(None::<NaiveDateTime>),
            ColumnType::Text => values.push_bind(None::<String>),
        },
        CellValue::Int(i) => values.push_bind(*i),
        CellValue::Float(f) => values.push_bind(*f),
        CellValue::Bool(b) => values.push_bind(*b),
        CellValue::Timestamp(ts) => values.push_bind(*ts),
        CellValue::Text(s) => values.push_bind(s.clone()),
    };
}

/// One pooled connection, returned to the pool on drop.
struct PostgresSession {
    conn: PoolConnection<Postgres>,
    schema: String,
}

fn arguments(params: &[SqlParam]) -> anyhow::Result<PgArguments> {
    let mut args = PgArguments::default();
    for param in params {
        let added = match param {
            SqlParam::Bool(b) => args.add(*b),
            SqlParam::Int(i) => args.add(*i),
            SqlParam::Float(f) => args.add(*f),
            SqlParam::Text(s) => args.add(s.clone()),
            SqlParam::Timestamp(ts) => args.add(*ts),
        };
        added.map_err(|e| anyhow::anyhow!(e))?;
    }
    Ok(args)
}

#[async_trait]
impl RelationalSession for PostgresSession {
    async fn columns(&mut self, table: &str) -> anyhow::Result<Vec<CatalogColumn>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT column_name::text, data_type::text FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type)| CatalogColumn { name, data_type })
            .collect())
    }

    async fn count(&mut self, statement: &SqlStatement) -> anyhow::Result<u64> {
        debug!(sql = %statement.text, params = statement.params.len(), "count");
        let count: i64 = sqlx::query_scalar_with(&statement.text, arguments(&statement.params)?)
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(u64::try_from(count)?)
    }

    async fn fetch(&mut self, statement: &SqlStatement) -> anyhow::Result<Vec<Row>> {
        debug!(sql = %statement.text, params = statement.params.len(), "fetch");
        let rows = sqlx::query_with(&statement.text, arguments(&statement.params)?)
            .fetch_all(&mut *self.conn)
            .await?;
        rows.iter().map(decode_row).collect()
    }
}

/// How a result column is read, chosen by its type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnDecoder {
    SmallInt,
    Int,
    BigInt,
    Real,
    Double,
    Numeric,
    Bool,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Uuid,
    Json,
    Bytes,
    IntArray,
    BigIntArray,
    DoubleArray,
    BoolArray,
    TextArray,
    /// Text-like types; anything else fails to decode and fails the query.
    Text,
}

impl ColumnDecoder {
    fn for_type(type_name: &str) -> Self {
        match type_name {
            "INT2" => Self::SmallInt,
            "INT4" => Self::Int,
            "INT8" => Self::BigInt,
            "FLOAT4" => Self::Real,
            "FLOAT8" => Self::Double,
            "NUMERIC" => Self::Numeric,
            "BOOL" => Self::Bool,
            "TIMESTAMP" => Self::Timestamp,
            "TIMESTAMPTZ" => Self::TimestampTz,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "UUID" => Self::Uuid,
            "JSON" | "JSONB" => Self::Json,
            "BYTEA" => Self::Bytes,
            "INT2[]" | "INT4[]" => Self::IntArray,
            "INT8[]" => Self::BigIntArray,
            "FLOAT4[]" | "FLOAT8[]" => Self::DoubleArray,
            "BOOL[]" => Self::BoolArray,
            "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => Self::TextArray,
            _ => Self::Text,
        }
    }
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

/// `NUMERIC` as a JSON number; values outside `f64` keep their exact text.
fn numeric(value: Decimal) -> Value {
    value
        .to_f64()
        .and_then(Number::from_f64)
        .map_or_else(|| Value::String(value.to_string()), Value::Number)
}

/// `BYTEA` in `PostgreSQL`'s hex output form.
fn bytes_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn decode_value(row: &PgRow, index: usize, decoder: ColumnDecoder) -> Result<Value, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }
    let value = match decoder {
        ColumnDecoder::SmallInt => Value::from(row.try_get::<i16, _>(index)?),
        ColumnDecoder::Int => Value::from(row.try_get::<i32, _>(index)?),
        ColumnDecoder::BigInt => Value::from(row.try_get::<i64, _>(index)?),
        ColumnDecoder::Real => float(f64::from(row.try_get::<f32, _>(index)?)),
        ColumnDecoder::Double => float(row.try_get::<f64, _>(index)?),
        ColumnDecoder::Numeric => numeric(row.try_get::<Decimal, _>(index)?),
        ColumnDecoder::Bool => Value::Bool(row.try_get::<bool, _>(index)?),
        ColumnDecoder::Timestamp => Value::String(
            row.try_get::<NaiveDateTime, _>(index)?
                .format("%Y-%m-%dT%H:%M:%S%.f")
                .to_string(),
        ),
        ColumnDecoder::TimestampTz => {
            Value::String(row.try_get::<DateTime<Utc>, _>(index)?.to_rfc3339())
        }
        ColumnDecoder::Date => Value::String(row.try_get::<NaiveDate, _>(index)?.to_string()),
        ColumnDecoder::Time => Value::String(row.try_get::<NaiveTime, _>(index)?.to_string()),
        ColumnDecoder::Uuid => Value::String(row.try_get::<Uuid, _>(index)?.to_string()),
        ColumnDecoder::Json => row.try_get::<Value, _>(index)?,
        ColumnDecoder::Bytes => Value::String(bytes_hex(&row.try_get::<Vec<u8>, _>(index)?)),
        ColumnDecoder::IntArray => Value::from(row.try_get::<Vec<Option<i32>>, _>(index)?),
        ColumnDecoder::BigIntArray => Value::from(row.try_get::<Vec<Option<i64>>, _>(index)?),
        ColumnDecoder::DoubleArray => Value::from(row.try_get::<Vec<Option<f64>>, _>(index)?),
        ColumnDecoder::BoolArray => Value::from(row.try_get::<Vec<Option<bool>>, _>(index)?),
        ColumnDecoder::TextArray => Value::from(row.try_get::<Vec<Option<String>>, _>(index)?),
        ColumnDecoder::Text => Value::String(row.try_get::<String, _>(index)?),
    };
    Ok(value)
}

fn decode_row(row: &PgRow) -> anyhow::Result<Row> {
    row.columns()
        .iter()
        .map(|column| -> anyhow::Result<(String, Value)> {
            let type_name = column.type_info().name();
            let value = decode_value(row, column.ordinal(), ColumnDecoder::for_type(type_name))
                .map_err(|e| {
                    anyhow::anyhow!("cannot decode column '{}' ({type_name}): {e}", column.name())
                })?;
            Ok((column.name().to_string(), value))
        })
        .collect()
}
