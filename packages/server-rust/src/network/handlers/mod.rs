//! HTTP handlers and the state they share.

pub mod documents;
pub mod error;
pub mod health;
pub mod params;
pub mod relational;
pub mod upload;

pub use error::ApiError;

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::service::{DocumentQueryService, IngestService, RelationalQueryService, Services};

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Every field is an `Arc` (or `Copy`), so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub documents: Arc<DocumentQueryService>,
    pub relational: Arc<RelationalQueryService>,
    pub ingest: Arc<IngestService>,
    /// Lifecycle state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(services: Services, shutdown: Arc<ShutdownController>) -> Self {
        Self {
            documents: services.documents,
            relational: services.relational,
            ingest: services.ingest,
            shutdown,
            start_time: Instant::now(),
        }
    }
}
