//! Quarry core: the backend-neutral query model, its SQL and document
//! renderers, the page envelope, result sanitizing and tabular inference.
//!
//! Nothing in this crate performs I/O. A request is validated, resolved
//! against a [`SchemaView`] into a [`QueryPlan`], then rendered for one
//! backend by [`compile::sql`] or [`compile::document`].

pub mod compile;
pub mod error;
pub mod filter;
pub mod page;
pub mod plan;
pub mod request;
pub mod sanitize;
pub mod schema;
pub mod tabular;

pub use error::{QueryError, StoreKind};
pub use filter::{Condition, FilterOperator, Operand, Scalar};
pub use page::PageResult;
pub use plan::{Pagination, QueryPlan, SearchPlan, SortPlan};
pub use request::{QueryRequest, SortOrder, DEFAULT_LIMIT, MAX_LIMIT};
pub use sanitize::Row;
pub use schema::{FieldDef, FieldKind, SchemaView};
pub use tabular::{ColumnType, FileFormat, TableDefinition, TabularData};
