//! Result sanitizer: strips identity fields and turns store-specific scalars
//! into portable JSON values.

use bson::{Bson, Document};
use serde_json::{Map, Number, Value};

use crate::compile::document::IDENTITY_FIELD;
use crate::compile::sql::IDENTITY_COLUMN;

/// One result row: field name to portable value.
pub type Row = Map<String, Value>;

/// Converts a BSON value into plain JSON.
///
/// Object ids become their hex string, datetimes become RFC 3339 strings,
/// non-finite doubles become `null`. Nested documents and arrays are
/// converted recursively.
#[must_use]
pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::from(i),
        Bson::Int64(i) => Value::from(i),
        Bson::Double(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        Bson::String(s) | Bson::Symbol(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => dt
            .try_to_rfc3339_string()
            .map_or_else(|_| Value::from(dt.timestamp_millis()), Value::String),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::Document(doc) => Value::Object(document_to_json(doc)),
        other => other.into_relaxed_extjson(),
    }
}

fn document_to_json(doc: Document) -> Row {
    doc.into_iter()
        .map(|(key, value)| (key, bson_to_json(value)))
        .collect()
}

/// Sanitizes one document: drops `_id` and converts every value.
#[must_use]
pub fn sanitize_document(mut doc: Document) -> Row {
    doc.remove(IDENTITY_FIELD);
    document_to_json(doc)
}

/// Sanitizes a page of documents, preserving order and count.
#[must_use]
pub fn sanitize_documents(docs: Vec<Document>) -> Vec<Row> {
    docs.into_iter().map(sanitize_document).collect()
}

/// Sanitizes a page of relational rows: drops the `id` column.
#[must_use]
pub fn sanitize_rows(rows: Vec<Row>) -> Vec<Row> {
    rows.into_iter()
        .map(|mut row| {
            row.remove(IDENTITY_COLUMN);
            row
        })
        .collect()
}
