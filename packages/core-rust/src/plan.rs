//! Backend-neutral query plan.
//!
//! A [`QueryPlan`] is the request after every field reference has been
//! checked against the [`SchemaView`]: filters resolved into typed
//! conditions, the search field set narrowed, the sort key validated, and
//! pagination turned into an offset. The SQL and document renderers only ever
//! see a plan, never the raw request.

use crate::error::QueryError;
use crate::filter::{resolve_filters, Condition};
use crate::request::{QueryRequest, SortOrder};
use crate::schema::SchemaView;

/// Free-text search restricted to existing fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPlan {
    /// Trimmed, non-empty search term (not yet escaped).
    pub term: String,
    /// Fields to search, OR-combined. Never empty.
    pub fields: Vec<String>,
}

/// Resolved ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortPlan {
    /// Ascending on the store's surrogate identity field.
    Default,
    /// Explicit field from the schema.
    Field {
        /// Field to order by.
        name: String,
        /// Direction.
        order: SortOrder,
    },
}

/// Page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-indexed page number.
    pub page: u32,
    /// Rows per page.
    pub limit: u32,
    /// Rows skipped before this page.
    pub offset: u64,
}

/// Everything a backend needs to run one paginated query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// AND-combined field conditions.
    pub conditions: Vec<Condition>,
    /// Optional OR-group, AND-combined with the conditions.
    pub search: Option<SearchPlan>,
    /// Ordering.
    pub sort: SortPlan,
    /// Page window.
    pub pagination: Pagination,
}

impl QueryPlan {
    /// Resolves a validated request against a schema view.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Validation`] if the request shape is invalid or
    /// a filter payload on a known field is malformed.
    pub fn build(request: &QueryRequest, schema: &SchemaView) -> Result<Self, QueryError> {
        request.validate()?;

        let conditions = match &request.filters {
            Some(filters) => resolve_filters(filters, schema)?,
            None => Vec::new(),
        };

        Ok(Self {
            conditions,
            search: plan_search(request, schema),
            sort: plan_sort(request, schema),
            pagination: Pagination {
                page: request.page,
                limit: request.limit,
                offset: request.offset(),
            },
        })
    }

    /// Whether the plan matches every row (no conditions, no search).
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.conditions.is_empty() && self.search.is_none()
    }
}

fn plan_search(request: &QueryRequest, schema: &SchemaView) -> Option<SearchPlan> {
    let term = request.search_term()?;

    let mut fields: Vec<String> = Vec::new();
    match &request.search_columns {
        Some(columns) => {
            for column in columns {
                if schema.contains(column) && !fields.contains(column) {
                    fields.push(column.clone());
                }
            }
        }
        None => fields.extend(schema.names().map(str::to_string)),
    }

    if fields.is_empty() {
        return None;
    }

    Some(SearchPlan {
        term: term.to_string(),
        fields,
    })
}

fn plan_sort(request: &QueryRequest, schema: &SchemaView) -> SortPlan {
    match &request.sort_by {
        Some(name) if schema.contains(name) => SortPlan::Field {
            name: name.clone(),
            order: request.sort_order,
        },
        _ => SortPlan::Default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> SchemaView {
        SchemaView::from_names(["title", "author", "published_year"])
    }

    fn request(value: serde_json::Value) -> QueryRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn search_defaults_to_every_field() {
        let plan = QueryPlan::build(&request(json!({"search": "space"})), &schema()).unwrap();
        let search = plan.search.unwrap();
        assert_eq!(search.term, "space");
        assert_eq!(search.fields, vec!["title", "author", "published_year"]);
    }

    #[test]
    fn search_columns_are_intersected_with_schema() {
        let plan = QueryPlan::build(
            &request(json!({"search": "space", "search_columns": ["ghost", "title", "title"]})),
            &schema(),
        )
        .unwrap();
        assert_eq!(plan.search.unwrap().fields, vec!["title"]);
    }

    #[test]
    fn search_with_no_valid_columns_has_no_effect() {
        let plan = QueryPlan::build(
            &request(json!({"search": "space", "search_columns": ["ghost"]})),
            &schema(),
        )
        .unwrap();
        assert!(plan.search.is_none());
        assert!(plan.is_unfiltered());
    }

    #[test]
    fn blank_search_has_no_effect() {
        let plan = QueryPlan::build(&request(json!({"search": "  "})), &schema()).unwrap();
        assert!(plan.search.is_none());
    }

    #[test]
    fn sort_falls_back_when_field_is_missing() {
        let plan = QueryPlan::build(
            &request(json!({"sort_by": "ghost", "sort_order": "desc"})),
            &schema(),
        )
        .unwrap();
        assert_eq!(plan.sort, SortPlan::Default);

        let plan = QueryPlan::build(&request(json!({})), &schema()).unwrap();
        assert_eq!(plan.sort, SortPlan::Default);
    }

    #[test]
    fn sort_uses_known_field_and_direction() {
        let plan = QueryPlan::build(
            &request(json!({"sort_by": "published_year", "sort_order": "desc"})),
            &schema(),
        )
        .unwrap();
        assert_eq!(
            plan.sort,
            SortPlan::Field {
                name: "published_year".to_string(),
                order: SortOrder::Desc
            }
        );
    }

    #[test]
    fn pagination_offset() {
        let plan =
            QueryPlan::build(&request(json!({"page": 3, "limit": 10})), &schema()).unwrap();
        assert_eq!(
            plan.pagination,
            Pagination {
                page: 3,
                limit: 10,
                offset: 20
            }
        );
    }

    #[test]
    fn invalid_shape_is_rejected_before_resolution() {
        let result = QueryPlan::build(&request(json!({"limit": 5000})), &schema());
        assert!(matches!(result, Err(QueryError::Validation(_))));
    }

    #[test]
    fn unknown_field_plan_equals_plan_without_it() {
        let with_unknown = QueryPlan::build(
            &request(json!({
                "filters": {"published_year": {"gte": 2010}, "ghost": {"eq": 1}},
                "search": "space",
                "search_columns": ["title", "ghost"]
            })),
            &schema(),
        )
        .unwrap();
        let without = QueryPlan::build(
            &request(json!({
                "filters": {"published_year": {"gte": 2010}},
                "search": "space",
                "search_columns": ["title"]
            })),
            &schema(),
        )
        .unwrap();
        assert_eq!(with_unknown, without);
    }
}
