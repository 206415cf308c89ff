//! Per-field statistics over a sample of rows.

use std::collections::{BTreeMap, BTreeSet};

use quarry_core::Row;
use serde::Serialize;
use serde_json::Value;

/// Distinct sample values kept per field.
pub const MAX_SAMPLE_VALUES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldStats {
    pub non_null_count: usize,
    /// JSON type of the first non-null value.
    pub data_type: &'static str,
    /// Up to [`MAX_SAMPLE_VALUES`] distinct values, rendered as text and
    /// sorted.
    pub sample_values: Vec<String>,
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Statistics for each of `fields` over `rows`. Fields with no non-null
/// value in the sample are left out.
#[must_use]
pub fn field_stats<'a>(
    fields: impl IntoIterator<Item = &'a str>,
    rows: &[Row],
) -> BTreeMap<String, FieldStats> {
    let mut stats = BTreeMap::new();
    for field in fields {
        let values: Vec<&Value> = rows
            .iter()
            .filter_map(|row| row.get(field))
            .filter(|value| !value.is_null())
            .collect();
        let Some(first) = values.first() else {
            continue;
        };

        let distinct: BTreeSet<String> = values.iter().map(|v| render(v)).collect();
        stats.insert(
            field.to_string(),
            FieldStats {
                non_null_count: values.len(),
                data_type: type_name(first),
                sample_values: distinct.into_iter().take(MAX_SAMPLE_VALUES).collect(),
            },
        );
    }
    stats
}
