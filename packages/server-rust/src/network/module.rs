//! Network module with deferred startup lifecycle.
//!
//! `new()` wires state, `start()` binds the TCP listener, and `serve()`
//! accepts connections until the shutdown future resolves, then drains the
//! in-flight query requests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{documents, health, relational, upload, AppState};
use super::middleware::build_http_layers;
use super::shutdown::{track_in_flight, ShutdownController};
use crate::service::Services;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the listener, the shutdown controller and the services behind the
/// router.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    services: Services,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, services: Services) -> Self {
        Self {
            config,
            listener: None,
            services,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// The `/api` routes sit behind the in-flight tracker; the probes do
    /// not, so they keep answering while the server drains.
    pub fn build_router(&self) -> Router {
        build_router(
            &self.config,
            AppState::new(self.services.clone(), Arc::clone(&self.shutdown)),
        )
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured one
    /// when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then waits up to 30 seconds for
    /// in-flight query requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let listener = self
            .listener
            .take()
            .expect("start() must be called before serve()");
        let controller = self.shutdown;

        controller.set_ready();
        info!("serving HTTP");

        let signal = {
            let controller = Arc::clone(&controller);
            async move {
                shutdown.await;
                info!("shutdown requested, refusing new queries");
                controller.trigger_shutdown();
            }
        };

        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;

        if controller.wait_for_drain(DRAIN_TIMEOUT).await {
            info!("all in-flight requests drained");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timeout expired with requests remaining"
            );
        }
        Ok(())
    }
}

fn build_router(config: &NetworkConfig, state: AppState) -> Router {
    let api = Router::new()
        .route("/mongodb/collections", get(documents::list_collections))
        .route(
            "/mongodb/collections/{name}/query",
            get(documents::query_collection),
        )
        .route(
            "/mongodb/collections/{name}/query-json",
            post(documents::query_collection_json),
        )
        .route(
            "/mongodb/collections/{name}/stats",
            get(documents::collection_stats),
        )
        .route(
            "/mongodb/collections/{name}/indexes",
            get(documents::list_indexes).post(documents::create_index),
        )
        .route("/postgres/tables", get(relational::list_tables))
        .route("/postgres/tables/{name}/query", get(relational::query_table))
        .route(
            "/postgres/tables/{name}/query-json",
            post(relational::query_table_json),
        )
        .route("/postgres/tables/{name}/stats", get(relational::table_stats))
        .route("/upload", post(upload::upload_file))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state.shutdown),
            track_in_flight,
        ));

    Router::new()
        .route("/", get(health::root_handler))
        .route("/health", get(health::health_handler))
        .route("/health/live", get(health::liveness_handler))
        .route("/health/ready", get(health::readiness_handler))
        .route("/health/database", get(health::database_handler))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(build_http_layers(config))
        .with_state(state)
}
