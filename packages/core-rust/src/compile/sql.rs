//! Renders a [`QueryPlan`] into parameterized `PostgreSQL`.
//!
//! Only identifiers are written into the statement text, always through
//! [`quote_identifier`] and only after they were checked against the schema
//! view. Every operand becomes a positional `$n` parameter.

use chrono::NaiveDateTime;

use crate::filter::{Condition, FilterOperator, Operand, Scalar};
use crate::plan::{QueryPlan, SearchPlan, SortPlan};
use crate::schema::{FieldKind, SchemaView};
use crate::tabular::parse_timestamp;

/// Surrogate primary key of ingested tables.
pub const IDENTITY_COLUMN: &str = "id";

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// `BOOLEAN`.
    Bool(bool),
    /// `BIGINT`.
    Int(i64),
    /// `DOUBLE PRECISION`.
    Float(f64),
    /// `TEXT`.
    Text(String),
    /// `TIMESTAMP` (without time zone).
    Timestamp(NaiveDateTime),
}

/// Statement text plus its parameters in `$1..$n` order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    /// Statement text.
    pub text: String,
    /// Parameters, index `i` binds to `$i+1`.
    pub params: Vec<SqlParam>,
}

/// WHERE clause body (without the keyword) and its parameters.
///
/// An empty `text` means "no predicate".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    /// Clause body, e.g. `"year" >= $1 AND "title" = $2`.
    pub text: String,
    /// Parameters referenced by `text`.
    pub params: Vec<SqlParam>,
}

/// The two statements run for one page: count, then fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    /// `SELECT COUNT(*)` over the predicate.
    pub count: SqlStatement,
    /// Predicate, ordering and `LIMIT`/`OFFSET`.
    pub page: SqlStatement,
}

/// Tracks the next positional placeholder.
#[derive(Debug, Default)]
struct Params {
    values: Vec<SqlParam>,
}

impl Params {
    fn push(&mut self, value: SqlParam) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }
}

/// Double-quotes an identifier, doubling embedded quotes.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escapes `LIKE` metacharacters so `text` matches literally.
///
/// Uses the default `LIKE` escape character (backslash).
#[must_use]
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Renders the plan's search group and conditions as one WHERE clause.
///
/// The search OR-group comes first, then one clause per condition, all
/// joined with `AND`.
#[must_use]
pub fn compile_where(plan: &QueryPlan, schema: &SchemaView) -> WhereClause {
    let mut params = Params::default();
    let mut parts: Vec<String> = Vec::new();

    if let Some(search) = &plan.search {
        parts.push(render_search(search, &mut params));
    }

    for condition in &plan.conditions {
        let kind = schema.kind_of(&condition.field).unwrap_or(FieldKind::Unknown);
        parts.push(render_condition(condition, kind, &mut params));
    }

    WhereClause {
        text: parts.join(" AND "),
        params: params.values,
    }
}

/// Renders the ORDER BY clause, falling back to the identity column.
#[must_use]
pub fn compile_order(sort: &SortPlan) -> String {
    match sort {
        SortPlan::Default => format!("ORDER BY {}", quote_identifier(IDENTITY_COLUMN)),
        SortPlan::Field { name, order } => {
            format!("ORDER BY {} {}", quote_identifier(name), order.as_sql())
        }
    }
}

/// Renders the count and page statements for `table`.
#[must_use]
pub fn compile_query(table: &str, plan: &QueryPlan, schema: &SchemaView) -> SqlQuery {
    let clause = compile_where(plan, schema);
    let table = quote_identifier(table);

    let where_sql = if clause.text.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clause.text)
    };

    let count = SqlStatement {
        text: format!("SELECT COUNT(*) FROM {table}{where_sql}"),
        params: clause.params.clone(),
    };

    let mut page_params = clause.params;
    let limit_index = page_params.len() + 1;
    page_params.push(SqlParam::Int(i64::from(plan.pagination.limit)));
    page_params.push(SqlParam::Int(
        i64::try_from(plan.pagination.offset).unwrap_or(i64::MAX),
    ));

    let page = SqlStatement {
        text: format!(
            "SELECT * FROM {table}{where_sql} {order} LIMIT ${limit_index} OFFSET ${offset_index}",
            order = compile_order(&plan.sort),
            offset_index = limit_index + 1,
        ),
        params: page_params,
    };

    SqlQuery { count, page }
}

fn render_search(search: &SearchPlan, params: &mut Params) -> String {
    let pattern = format!("%{}%", escape_like(&search.term));
    let alternatives: Vec<String> = search
        .fields
        .iter()
        .map(|field| {
            let placeholder = params.push(SqlParam::Text(pattern.clone()));
            format!("CAST({} AS TEXT) ILIKE {placeholder}", quote_identifier(field))
        })
        .collect();
    format!("({})", alternatives.join(" OR "))
}

fn render_condition(condition: &Condition, kind: FieldKind, params: &mut Params) -> String {
    let column = quote_identifier(&condition.field);

    match (&condition.operand, condition.operator) {
        (Operand::List(values), _) => {
            if values.is_empty() {
                return "FALSE".to_string();
            }
            let placeholders: Vec<String> = values
                .iter()
                .map(|value| params.push(coerce(value, kind)))
                .collect();
            format!("{column} IN ({})", placeholders.join(", "))
        }
        (Operand::Scalar(Scalar::Null), FilterOperator::Ne) => format!("{column} IS NOT NULL"),
        (Operand::Scalar(Scalar::Null), _) => format!("{column} IS NULL"),
        (Operand::Scalar(value), op) if op.is_pattern() => {
            let text = escape_like(&value.to_pattern_text());
            let pattern = match op {
                FilterOperator::StartsWith => format!("{text}%"),
                FilterOperator::EndsWith => format!("%{text}"),
                _ => format!("%{text}%"),
            };
            let placeholder = params.push(SqlParam::Text(pattern));
            format!("CAST({column} AS TEXT) ILIKE {placeholder}")
        }
        (Operand::Scalar(value), op) => {
            let symbol = match op {
                FilterOperator::Gte => ">=",
                FilterOperator::Gt => ">",
                FilterOperator::Lte => "<=",
                FilterOperator::Lt => "<",
                FilterOperator::Ne => "!=",
                _ => "=",
            };
            let placeholder = params.push(coerce(value, kind));
            format!("{column} {symbol} {placeholder}")
        }
    }
}

/// Converts a non-null operand toward the column's declared kind.
///
/// Conversions only happen when lossless; otherwise the operand is bound as
/// given and the database decides.
fn coerce(value: &Scalar, kind: FieldKind) -> SqlParam {
    convert_to_kind(value, kind).unwrap_or_else(|| match value {
        Scalar::Bool(b) => SqlParam::Bool(*b),
        Scalar::Int(i) => SqlParam::Int(*i),
        Scalar::Float(f) => SqlParam::Float(*f),
        Scalar::Text(s) => SqlParam::Text(s.clone()),
        Scalar::Null => SqlParam::Text(String::new()),
    })
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn convert_to_kind(value: &Scalar, kind: FieldKind) -> Option<SqlParam> {
    match (kind, value) {
        (FieldKind::Integer, Scalar::Float(f))
            if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 =>
        {
            Some(SqlParam::Int(*f as i64))
        }
        (FieldKind::Integer, Scalar::Text(s)) => s.trim().parse().ok().map(SqlParam::Int),
        (FieldKind::Float, Scalar::Int(i)) => Some(SqlParam::Float(*i as f64)),
        (FieldKind::Float, Scalar::Text(s)) => s.trim().parse().ok().map(SqlParam::Float),
        (FieldKind::Boolean, Scalar::Text(s)) => {
            if s.eq_ignore_ascii_case("true") {
                Some(SqlParam::Bool(true))
            } else if s.eq_ignore_ascii_case("false") {
                Some(SqlParam::Bool(false))
            } else {
                None
            }
        }
        (FieldKind::Timestamp, Scalar::Text(s)) => parse_timestamp(s).map(SqlParam::Timestamp),
        (FieldKind::Text, other) => Some(SqlParam::Text(other.to_pattern_text())),
        _ => None,
    }
}
