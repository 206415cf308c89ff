//! Structured filter model: the closed operator set and typed operands.
//!
//! The caller sends filters as loose JSON (`{"age": {"gte": 18}, "status":
//! "active"}`). [`resolve_filters`] turns that into a list of typed
//! [`Condition`]s restricted to the discovered schema. Both backend renderers
//! consume the same condition list.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::QueryError;
use crate::schema::SchemaView;

/// Operators understood by the filter compiler. Anything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    /// Greater than or equal.
    Gte,
    /// Strictly greater than.
    Gt,
    /// Less than or equal.
    Lte,
    /// Strictly less than.
    Lt,
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Membership in a list.
    In,
    /// Case-insensitive substring match.
    Contains,
    /// Case-insensitive prefix match.
    StartsWith,
    /// Case-insensitive suffix match.
    EndsWith,
}

impl FilterOperator {
    /// Looks up an operator by its wire name. Unknown names yield `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "gte" => Self::Gte,
            "gt" => Self::Gt,
            "lte" => Self::Lte,
            "lt" => Self::Lt,
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "in" => Self::In,
            "contains" => Self::Contains,
            "startswith" => Self::StartsWith,
            "endswith" => Self::EndsWith,
            _ => return None,
        })
    }

    /// Wire name of the operator.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gte => "gte",
            Self::Gt => "gt",
            Self::Lte => "lte",
            Self::Lt => "lt",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::In => "in",
            Self::Contains => "contains",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
        }
    }

    /// Whether the operator is a case-insensitive text pattern.
    #[must_use]
    pub fn is_pattern(self) -> bool {
        matches!(self, Self::Contains | Self::StartsWith | Self::EndsWith)
    }

    /// Whether the operator is an ordering comparison.
    #[must_use]
    pub fn is_ordering(self) -> bool {
        matches!(self, Self::Gte | Self::Gt | Self::Lte | Self::Lt)
    }
}

/// A JSON scalar with the integer/float distinction made explicit.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// JSON null.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// Number representable as `i64`.
    Int(i64),
    /// Any other number.
    Float(f64),
    /// JSON string.
    Text(String),
}

impl Scalar {
    /// Converts a JSON value, returning `None` for arrays and objects.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Text used when the scalar feeds a pattern operator.
    #[must_use]
    pub fn to_pattern_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    /// Whether this is JSON null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Operand attached to a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Single value (comparisons, equality, pattern text).
    Scalar(Scalar),
    /// Value list for `in`.
    List(Vec<Scalar>),
}

/// One typed condition on one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Field the condition applies to. Always present in the schema view.
    pub field: String,
    /// Operator to apply.
    pub operator: FilterOperator,
    /// Operand, already checked against the operator.
    pub operand: Operand,
}

/// Resolves the caller's filter mapping against the discovered schema.
///
/// Fields missing from the schema and unknown operators are dropped, as is
/// `in` with a non-list operand. Fields are visited in map order, so the
/// same input always yields the same conditions in the same order.
///
/// # Errors
///
/// Returns [`QueryError::Validation`] for malformed payloads on known
/// fields: a bare array as a field spec, a non-scalar operand, a `null`
/// operand for an ordering or pattern operator, or a non-scalar/`null` entry
/// inside an `in` list.
pub fn resolve_filters(
    filters: &Map<String, Value>,
    schema: &SchemaView,
) -> Result<Vec<Condition>, QueryError> {
    let mut conditions = Vec::new();

    for (field, spec) in filters {
        if !schema.contains(field) {
            debug!(field = %field, "ignoring filter on unknown field");
            continue;
        }

        match spec {
            Value::Object(operators) => {
                for (name, raw) in operators {
                    let Some(operator) = FilterOperator::parse(name) else {
                        debug!(field = %field, operator = %name, "ignoring unknown filter operator");
                        continue;
                    };
                    if let Some(operand) = resolve_operand(field, operator, raw)? {
                        conditions.push(Condition {
                            field: field.clone(),
                            operator,
                            operand,
                        });
                    }
                }
            }
            Value::Array(_) => {
                return Err(QueryError::validation(format!(
                    "filter for field '{field}' must be a scalar or an operator object"
                )));
            }
            scalar => {
                let value = Scalar::from_json(scalar).unwrap_or(Scalar::Null);
                conditions.push(Condition {
                    field: field.clone(),
                    operator: FilterOperator::Eq,
                    operand: Operand::Scalar(value),
                });
            }
        }
    }

    Ok(conditions)
}

fn resolve_operand(
    field: &str,
    operator: FilterOperator,
    raw: &Value,
) -> Result<Option<Operand>, QueryError> {
    let malformed = |what: &str| {
        QueryError::validation(format!(
            "operator '{}' on field '{field}' {what}",
            operator.as_str()
        ))
    };

    if operator == FilterOperator::In {
        let Value::Array(items) = raw else {
            return Ok(None);
        };
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match Scalar::from_json(item) {
                Some(value) if !value.is_null() => values.push(value),
                _ => return Err(malformed("requires a list of non-null scalars")),
            }
        }
        return Ok(Some(Operand::List(values)));
    }

    let Some(value) = Scalar::from_json(raw) else {
        return Err(malformed("requires a scalar operand"));
    };

    if operator.is_pattern() {
        if value.is_null() {
            return Err(malformed("requires a non-null operand"));
        }
        return Ok(Some(Operand::Scalar(Scalar::Text(value.to_pattern_text()))));
    }

    if operator.is_ordering() && value.is_null() {
        return Err(malformed("requires a non-null operand"));
    }

    Ok(Some(Operand::Scalar(value)))
}
