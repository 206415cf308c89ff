//! Backend renderers for a [`QueryPlan`](crate::plan::QueryPlan).

pub mod document;
pub mod sql;
