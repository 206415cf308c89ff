//! Quarry server: query gateway over `MongoDB` and `PostgreSQL`, with CSV/Excel
//! ingestion into both.

pub mod network;
pub mod service;
pub mod storage;
pub mod traits;

pub use traits::{DocumentStore, RelationalSession, RelationalStore};
