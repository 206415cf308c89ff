//! Query, statistics and ingestion services over the store traits.
//!
//! Each service owns an `Arc` of its store and turns store failures into
//! [`QueryError`]s. Every public operation runs inside a `query` span that
//! records its duration and outcome.

pub mod config;
pub mod document;
pub mod ingest;
pub mod relational;
pub mod stats;

pub use config::{GatewayConfig, MongoConfig, PostgresConfig, ServerArgs};
pub use document::DocumentQueryService;
pub use ingest::{IngestService, UploadOptions, UploadReport, UploadStatus};
pub use relational::RelationalQueryService;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use quarry_core::{QueryError, StoreKind};
use tracing::{debug, error, info_span, Instrument};

use crate::traits::{DocumentStore, RelationalStore};

/// The three services, built once over the shared store handles.
#[derive(Clone)]
pub struct Services {
    pub documents: Arc<DocumentQueryService>,
    pub relational: Arc<RelationalQueryService>,
    pub ingest: Arc<IngestService>,
}

impl Services {
    #[must_use]
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        relational: Arc<dyn RelationalStore>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            ingest: Arc::new(IngestService::new(
                Arc::clone(&documents),
                Arc::clone(&relational),
            )),
            documents: Arc::new(DocumentQueryService::new(documents, config.clone())),
            relational: Arc::new(RelationalQueryService::new(relational, config.clone())),
        }
    }
}

fn outcome<T>(result: &Result<T, QueryError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(QueryError::Validation(_)) => "invalid",
        Err(QueryError::NotFound { .. }) => "not_found",
        Err(QueryError::Execution { .. }) => "error",
    }
}

/// Runs `operation` inside a `query` span and records its duration and
/// outcome. Execution failures are logged with their native cause.
pub(crate) async fn observe<T, F>(
    store: StoreKind,
    target: &str,
    operation: &'static str,
    fut: F,
) -> Result<T, QueryError>
where
    F: Future<Output = Result<T, QueryError>>,
{
    let span = info_span!(
        "query",
        store = store.as_str(),
        target = %target,
        operation = operation,
        duration_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );

    async move {
        let start = Instant::now();
        let result = fut.await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let outcome = outcome(&result);

        let span = tracing::Span::current();
        span.record("duration_ms", duration_ms);
        span.record("outcome", outcome);

        match &result {
            Err(QueryError::Execution {
                store,
                target,
                operation,
                source,
            }) => error!(
                store = store.as_str(),
                target = %target,
                operation = *operation,
                error = ?source,
                "store operation failed"
            ),
            _ => debug!(duration_ms, outcome, "query complete"),
        }

        result
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn observe_passes_results_through() {
        let ok = observe(StoreKind::Document, "books", "query", async { Ok::<_, QueryError>(7) })
            .await
            .unwrap();
        assert_eq!(ok, 7);

        let err = observe(StoreKind::Relational, "books", "query", async {
            Err::<u8, _>(QueryError::not_found(StoreKind::Relational, "books"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, QueryError::NotFound { .. }));
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(outcome::<()>(&Ok(())), "ok");
        assert_eq!(outcome::<()>(&Err(QueryError::validation("x"))), "invalid");
        assert_eq!(
            outcome::<()>(&Err(QueryError::execution(
                StoreKind::Document,
                "books",
                "count documents in",
                anyhow::anyhow!("boom")
            ))),
            "error"
        );
    }
}
