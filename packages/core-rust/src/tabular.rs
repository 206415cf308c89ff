//! Tabular upload model: CSV and Excel decoding, column type inference,
//! identifier sanitizing and the relational table definition derived from a
//! file.

use std::io::Cursor;

use bson::{Bson, Document};
use calamine::{Data, Reader};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::compile::sql::{quote_identifier, IDENTITY_COLUMN};
use crate::error::QueryError;

/// Column added by every generated table alongside the identity column.
pub const CREATED_AT_COLUMN: &str = "created_at";

const RESERVED_COLUMNS: [&str; 2] = [IDENTITY_COLUMN, CREATED_AT_COLUMN];
const RESERVED_PREFIX: &str = "src_";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Decoded file: header plus rows of optional cells.
///
/// Every row has exactly `columns.len()` cells; empty or whitespace-only
/// cells are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularData {
    /// Header names as they appear in the file (trimmed).
    pub columns: Vec<String>,
    /// Data rows.
    pub rows: Vec<Vec<Option<String>>>,
}

impl TabularData {
    /// Number of data rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of column `index`, top to bottom.
    pub fn column(&self, index: usize) -> impl Iterator<Item = Option<&str>> {
        self.rows
            .iter()
            .map(move |row| row.get(index).and_then(|cell| cell.as_deref()))
    }
}

/// Upload format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// `.csv`
    Csv,
    /// `.xls` or `.xlsx`; the first worksheet is read.
    Excel,
}

impl FileFormat {
    /// Matches the extension case-insensitively.
    #[must_use]
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, extension) = filename.trim().rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xls" | "xlsx" => Some(Self::Excel),
            _ => None,
        }
    }

    /// Decodes `bytes` in this format.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Validation`] if the bytes cannot be decoded or
    /// the header row is missing.
    pub fn decode(self, bytes: &[u8]) -> Result<TabularData, QueryError> {
        match self {
            Self::Csv => decode_csv(bytes),
            Self::Excel => decode_excel(bytes),
        }
    }
}

fn processing_error(err: impl std::fmt::Display) -> QueryError {
    QueryError::validation(format!("Error processing file: {err}"))
}

/// Assembles decoded records under `columns`.
///
/// Short rows are padded with empty cells, long rows are truncated to the
/// header width, rows without any value are skipped.
fn assemble<I, R>(columns: Vec<String>, records: I) -> Result<TabularData, QueryError>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = Option<String>>,
{
    if columns.is_empty() || columns.iter().all(String::is_empty) {
        return Err(QueryError::validation("File has no header row"));
    }

    let mut rows = Vec::new();
    for record in records {
        let mut row: Vec<Option<String>> = record.into_iter().take(columns.len()).collect();
        row.resize(columns.len(), None);
        if row.iter().any(Option::is_some) {
            rows.push(row);
        }
    }
    Ok(TabularData { columns, rows })
}

/// Decodes CSV bytes with a header row.
///
/// # Errors
///
/// Returns [`QueryError::Validation`] if the bytes are not valid CSV or the
/// header row is missing.
pub fn decode_csv(bytes: &[u8]) -> Result<TabularData, QueryError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let columns: Vec<String> = reader
        .headers()
        .map_err(processing_error)?
        .iter()
        .map(str::to_string)
        .collect();

    let records = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(processing_error)?;
    assemble(
        columns,
        records.iter().map(|record| {
            record
                .iter()
                .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                .collect::<Vec<_>>()
        }),
    )
}

/// Text form of one spreadsheet cell; blanks and error cells are `None`.
fn excel_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_datetime().map_or_else(
            || dt.as_f64().to_string(),
            |ts| ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        ),
    };
    (!text.is_empty()).then_some(text)
}

/// Decodes the first worksheet of an `.xls`/`.xlsx` workbook. The first
/// non-empty row is the header.
///
/// # Errors
///
/// Returns [`QueryError::Validation`] if the bytes are not a readable
/// workbook, it has no worksheet, or the header row is missing.
pub fn decode_excel(bytes: &[u8]) -> Result<TabularData, QueryError> {
    let mut workbook =
        calamine::open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(processing_error)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| QueryError::validation("Workbook has no worksheets"))?
        .map_err(processing_error)?;

    let mut rows = range.rows();
    let columns: Vec<String> = rows
        .next()
        .map(|header| {
            header
                .iter()
                .map(|cell| excel_text(cell).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default();

    assemble(columns, rows.map(|row| row.iter().map(excel_text)))
}

/// Parses the timestamp shapes accepted by ingestion and filters.
///
/// RFC 3339 values are normalized to naive UTC.
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_bool(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_float(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Inferred relational type of an uploaded column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Every value parses as `i64`.
    BigInt,
    /// Every value parses as a finite `f64`.
    DoublePrecision,
    /// Every value is `true` or `false`.
    Boolean,
    /// Every value is a recognized timestamp.
    Timestamp,
    /// Fallback.
    Text,
}

impl ColumnType {
    /// DDL type name.
    #[must_use]
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::BigInt => "BIGINT",
            Self::DoublePrecision => "DOUBLE PRECISION",
            Self::Boolean => "BOOLEAN",
            Self::Timestamp => "TIMESTAMP",
            Self::Text => "TEXT",
        }
    }

    /// Infers the narrowest type that accepts every non-empty value.
    ///
    /// A column with no values is `TEXT`.
    pub fn infer<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        let mut seen = false;
        let mut int = true;
        let mut float = true;
        let mut boolean = true;
        let mut timestamp = true;

        for value in values.into_iter().flatten() {
            seen = true;
            int = int && value.parse::<i64>().is_ok();
            float = float && parse_float(value).is_some();
            boolean = boolean && parse_bool(value).is_some();
            timestamp = timestamp && parse_timestamp(value).is_some();
            if !(int || float || boolean || timestamp) {
                return Self::Text;
            }
        }

        if !seen {
            Self::Text
        } else if int {
            Self::BigInt
        } else if float {
            Self::DoublePrecision
        } else if boolean {
            Self::Boolean
        } else if timestamp {
            Self::Timestamp
        } else {
            Self::Text
        }
    }

    /// Converts one cell into a value of this type.
    ///
    /// Inference guarantees the conversion succeeds for values that took
    /// part in it; anything else falls back to text.
    #[must_use]
    pub fn convert(self, cell: Option<&str>) -> CellValue {
        let Some(text) = cell else {
            return CellValue::Null;
        };
        let converted = match self {
            Self::BigInt => text.parse().ok().map(CellValue::Int),
            Self::DoublePrecision => parse_float(text).map(CellValue::Float),
            Self::Boolean => parse_bool(text).map(CellValue::Bool),
            Self::Timestamp => parse_timestamp(text).map(CellValue::Timestamp),
            Self::Text => None,
        };
        converted.unwrap_or_else(|| CellValue::Text(text.to_string()))
    }
}

/// One typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Empty cell.
    Null,
    /// `BIGINT`.
    Int(i64),
    /// `DOUBLE PRECISION`.
    Float(f64),
    /// `BOOLEAN`.
    Bool(bool),
    /// `TIMESTAMP`.
    Timestamp(NaiveDateTime),
    /// `TEXT`.
    Text(String),
}

impl CellValue {
    /// BSON form used for document inserts.
    #[must_use]
    pub fn to_bson(&self) -> Bson {
        match self {
            Self::Null => Bson::Null,
            Self::Int(i) => Bson::Int64(*i),
            Self::Float(f) => Bson::Double(*f),
            Self::Bool(b) => Bson::Boolean(*b),
            Self::Timestamp(ts) => {
                Bson::DateTime(bson::DateTime::from_millis(ts.and_utc().timestamp_millis()))
            }
            Self::Text(s) => Bson::String(s.clone()),
        }
    }
}

/// Makes `raw` a safe lowercase identifier.
///
/// Characters outside `[A-Za-z0-9_]` become `_`, a leading digit gets a
/// `col_` prefix, and an empty result becomes `col`.
#[must_use]
pub fn sanitize_identifier(raw: &str) -> String {
    let mut name: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        return "col".to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "col_");
    }
    name
}

/// Sanitizes a header row into unique column names.
///
/// Names that clash with the generated `id`/`created_at` columns get a
/// `src_` prefix; later duplicates get `_2`, `_3`, ... suffixes.
#[must_use]
pub fn column_names(headers: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(headers.len());
    for header in headers {
        let mut base = sanitize_identifier(header);
        if RESERVED_COLUMNS.contains(&base.as_str()) {
            base.insert_str(0, RESERVED_PREFIX);
        }
        let mut candidate = base.clone();
        let mut suffix = 2;
        while names.contains(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        names.push(candidate);
    }
    names
}

/// Makes a header row unique for use as document keys.
///
/// Headers keep their original text; later duplicates get `_2`, `_3`, ...
/// suffixes, matching [`column_names`].
#[must_use]
pub fn document_keys(headers: &[String]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(headers.len());
    for header in headers {
        let mut candidate = header.clone();
        let mut suffix = 2;
        while keys.contains(&candidate) {
            candidate = format!("{header}_{suffix}");
            suffix += 1;
        }
        keys.push(candidate);
    }
    keys
}

/// Target names for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetNames {
    /// Relational table (already sanitized).
    pub table: String,
    /// Document collection.
    pub collection: String,
}

fn normalize_name(raw: &str) -> String {
    raw.trim().replace([' ', '-'], "_").to_lowercase()
}

/// Derives table and collection names from the upload.
///
/// Without explicit names both default to `<stem>_<unix_secs>`.
#[must_use]
pub fn derive_names(
    filename: &str,
    table: Option<&str>,
    collection: Option<&str>,
    unix_secs: u64,
) -> TargetNames {
    let stem = filename
        .rsplit_once('.')
        .map_or(filename, |(stem, _)| stem);
    let default = format!("{}_{unix_secs}", normalize_name(stem));

    let pick = |explicit: Option<&str>| {
        explicit
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map_or_else(|| normalize_name(&default), normalize_name)
    };

    TargetNames {
        table: sanitize_identifier(&pick(table)),
        collection: pick(collection),
    }
}

/// A generated relational table: sanitized columns with inferred types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    /// Table name.
    pub name: String,
    /// User columns in file order.
    pub columns: Vec<(String, ColumnType)>,
}

impl TableDefinition {
    /// Builds the definition for `data`, inferring every column's type.
    #[must_use]
    pub fn infer(name: impl Into<String>, data: &TabularData) -> Self {
        let columns = column_names(&data.columns)
            .into_iter()
            .enumerate()
            .map(|(index, column)| (column, ColumnType::infer(data.column(index))))
            .collect();
        Self {
            name: name.into(),
            columns,
        }
    }

    /// `CREATE TABLE IF NOT EXISTS` statement with the generated identity
    /// and creation-time columns.
    #[must_use]
    pub fn create_statement(&self) -> String {
        let mut defs = vec![format!(
            "{} UUID DEFAULT gen_random_uuid() PRIMARY KEY",
            quote_identifier(IDENTITY_COLUMN)
        )];
        defs.extend(
            self.columns
                .iter()
                .map(|(name, ty)| format!("{} {}", quote_identifier(name), ty.sql_type())),
        );
        defs.push(format!(
            "{} TIMESTAMP DEFAULT NOW()",
            quote_identifier(CREATED_AT_COLUMN)
        ));
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_identifier(&self.name),
            defs.join(", ")
        )
    }

    /// `INSERT INTO "t" ("a", "b") VALUES` prefix for batched inserts.
    #[must_use]
    pub fn insert_prefix(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|(name, _)| quote_identifier(name))
            .collect();
        format!(
            "INSERT INTO {} ({}) ",
            quote_identifier(&self.name),
            columns.join(", ")
        )
    }

    /// Converts every row of `data` into typed cells.
    #[must_use]
    pub fn typed_rows(&self, data: &TabularData) -> Vec<Vec<CellValue>> {
        data.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .enumerate()
                    .map(|(index, (_, ty))| {
                        ty.convert(row.get(index).and_then(|cell| cell.as_deref()))
                    })
                    .collect()
            })
            .collect()
    }

    /// Converts every row into a document keyed by the original headers,
    /// made unique with [`document_keys`].
    #[must_use]
    pub fn documents(&self, data: &TabularData) -> Vec<Document> {
        let keys = document_keys(&data.columns);
        self.typed_rows(data)
            .into_iter()
            .map(|cells| {
                keys.iter()
                    .zip(cells.iter())
                    .map(|(header, cell)| (header.clone(), cell.to_bson()))
                    .collect()
            })
            .collect()
    }
}
