//! Renders a [`QueryPlan`] into `MongoDB` filter and sort documents.

use bson::{doc, Bson, Document};

use crate::filter::{Condition, FilterOperator, Operand, Scalar};
use crate::plan::{QueryPlan, SearchPlan, SortPlan};

/// Store-assigned identity field of every document.
pub const IDENTITY_FIELD: &str = "_id";

/// Filter, sort and window for one `find` call.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    /// Predicate shared by `count_documents` and `find`.
    pub filter: Document,
    /// Sort specification.
    pub sort: Document,
    /// Documents to skip.
    pub skip: u64,
    /// Maximum documents to return.
    pub limit: i64,
}

/// Renders the plan's search group and conditions as one filter document.
///
/// Every clause is a self-contained sub-document; more than one clause is
/// wrapped in `$and`, so repeated operators on a field never overwrite each
/// other.
#[must_use]
pub fn compile_filter(plan: &QueryPlan) -> Document {
    let mut clauses: Vec<Document> = Vec::new();

    if let Some(search) = &plan.search {
        clauses.push(render_search(search));
    }
    clauses.extend(plan.conditions.iter().map(render_condition));

    match clauses.len() {
        0 => Document::new(),
        1 => clauses.remove(0),
        _ => doc! { "$and": clauses },
    }
}

/// Renders the sort document, falling back to ascending `_id`.
#[must_use]
pub fn compile_sort(sort: &SortPlan) -> Document {
    match sort {
        SortPlan::Default => {
            let mut sort = Document::new();
            sort.insert(IDENTITY_FIELD, 1);
            sort
        }
        SortPlan::Field { name, order } => {
            let mut sort = Document::new();
            sort.insert(name.clone(), order.as_document_direction());
            sort
        }
    }
}

/// Renders the full `find` specification.
#[must_use]
pub fn compile_query(plan: &QueryPlan) -> DocumentQuery {
    DocumentQuery {
        filter: compile_filter(plan),
        sort: compile_sort(&plan.sort),
        skip: plan.pagination.offset,
        limit: i64::from(plan.pagination.limit),
    }
}

/// Converts a scalar operand into its BSON form.
#[must_use]
pub fn scalar_to_bson(value: &Scalar) -> Bson {
    match value {
        Scalar::Null => Bson::Null,
        Scalar::Bool(b) => Bson::Boolean(*b),
        Scalar::Int(i) => Bson::Int64(*i),
        Scalar::Float(f) => Bson::Double(*f),
        Scalar::Text(s) => Bson::String(s.clone()),
    }
}

fn case_insensitive_regex(pattern: String) -> Document {
    doc! { "$regex": pattern, "$options": "i" }
}

fn field_clause(field: &str, condition: impl Into<Bson>) -> Document {
    let mut clause = Document::new();
    clause.insert(field.to_string(), condition.into());
    clause
}

fn render_search(search: &SearchPlan) -> Document {
    let escaped = regex::escape(&search.term);
    let alternatives: Vec<Document> = search
        .fields
        .iter()
        .map(|field| field_clause(field, case_insensitive_regex(escaped.clone())))
        .collect();
    doc! { "$or": alternatives }
}

fn render_condition(condition: &Condition) -> Document {
    let field = condition.field.as_str();

    let predicate = match (&condition.operand, condition.operator) {
        (Operand::List(values), _) => {
            let values: Vec<Bson> = values.iter().map(scalar_to_bson).collect();
            doc! { "$in": values }
        }
        (Operand::Scalar(value), op) if op.is_pattern() => {
            let escaped = regex::escape(&value.to_pattern_text());
            let pattern = match op {
                FilterOperator::StartsWith => format!("^{escaped}"),
                FilterOperator::EndsWith => format!("{escaped}$"),
                _ => escaped,
            };
            case_insensitive_regex(pattern)
        }
        (Operand::Scalar(value), op) => {
            let key = match op {
                FilterOperator::Gte => "$gte",
                FilterOperator::Gt => "$gt",
                FilterOperator::Lte => "$lte",
                FilterOperator::Lt => "$lt",
                FilterOperator::Ne => "$ne",
                _ => "$eq",
            };
            let mut predicate = Document::new();
            predicate.insert(key, scalar_to_bson(value));
            predicate
        }
    };

    field_clause(field, predicate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::QueryRequest;
    use crate::schema::SchemaView;
    use serde_json::json;

    fn schema() -> SchemaView {
        SchemaView::from_names(["title", "author", "published_year", "category"])
    }

    fn plan(value: serde_json::Value) -> QueryPlan {
        let request: QueryRequest = serde_json::from_value(value).unwrap();
        QueryPlan::build(&request, &schema()).unwrap()
    }

    #[test]
    fn unfiltered_plan_matches_everything() {
        let query = compile_query(&plan(json!({})));
        assert!(query.filter.is_empty());
        assert_eq!(query.sort, doc! { "_id": 1 });
        assert_eq!(query.skip, 0);
        assert_eq!(query.limit, 10);
    }

    #[test]
    fn single_condition_is_not_wrapped() {
        let filter = compile_filter(&plan(json!({"filters": {"published_year": {"gte": 2010}}})));
        assert_eq!(filter, doc! { "published_year": { "$gte": 2010_i64 } });
    }

    #[test]
    fn scalar_filter_is_eq() {
        let filter = compile_filter(&plan(json!({"filters": {"category": "fiction"}})));
        assert_eq!(filter, doc! { "category": { "$eq": "fiction" } });
    }

    #[test]
    fn search_and_filters_are_and_combined() {
        let filter = compile_filter(&plan(json!({
            "search": "space",
            "search_columns": ["title"],
            "filters": {"published_year": {"gte": 2010}}
        })));
        assert_eq!(
            filter,
            doc! {
                "$and": [
                    { "$or": [ { "title": { "$regex": "space", "$options": "i" } } ] },
                    { "published_year": { "$gte": 2010_i64 } }
                ]
            }
        );
    }

    #[test]
    fn repeated_regex_operators_do_not_overwrite() {
        let filter = compile_filter(&plan(json!({
            "filters": {"title": {"endswith": "end", "startswith": "deep"}}
        })));
        assert_eq!(
            filter,
            doc! {
                "$and": [
                    { "title": { "$regex": "end$", "$options": "i" } },
                    { "title": { "$regex": "^deep", "$options": "i" } }
                ]
            }
        );
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        let filter = compile_filter(&plan(json!({
            "search": "a.b*",
            "search_columns": ["title"]
        })));
        let expected = regex::escape("a.b*");
        assert_eq!(expected, r"a\.b\*");
        assert_eq!(
            filter,
            doc! { "$or": [ { "title": { "$regex": expected, "$options": "i" } } ] }
        );
    }

    #[test]
    fn in_and_ne_operators() {
        let filter = compile_filter(&plan(json!({
            "filters": {"author": {"ne": null}, "category": {"in": ["fiction", "science"]}}
        })));
        assert_eq!(
            filter,
            doc! {
                "$and": [
                    { "author": { "$ne": Bson::Null } },
                    { "category": { "$in": ["fiction", "science"] } }
                ]
            }
        );
    }

    #[test]
    fn explicit_sort_direction() {
        let sort = compile_sort(&plan(json!({"sort_by": "published_year", "sort_order": "desc"})).sort);
        assert_eq!(sort, doc! { "published_year": -1 });
    }

    #[test]
    fn pagination_window() {
        let query = compile_query(&plan(json!({"page": 3, "limit": 10})));
        assert_eq!(query.skip, 20);
        assert_eq!(query.limit, 10);
    }

    #[test]
    fn compilation_is_deterministic() {
        let request = json!({
            "search": "x",
            "filters": {"category": {"in": ["a"]}, "published_year": {"gt": 1, "lt": 9}}
        });
        assert_eq!(compile_query(&plan(request.clone())), compile_query(&plan(request)));
    }
}
