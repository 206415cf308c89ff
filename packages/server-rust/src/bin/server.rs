//! `quarry-server` entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use quarry_server::network::NetworkModule;
use quarry_server::service::config::LogFormat;
use quarry_server::service::{ServerArgs, Services};
use quarry_server::storage::{MongoStore, PostgresStore};
use quarry_server::{DocumentStore, RelationalStore};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => error!("failed to install SIGTERM handler: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, initiating graceful shutdown"),
        () = terminate => info!("received SIGTERM, initiating graceful shutdown"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();
    init_tracing(args.log_format);

    let documents: Arc<dyn DocumentStore> = Arc::new(
        MongoStore::connect(&args.mongo_config())
            .await
            .context("invalid MongoDB configuration")?,
    );
    let relational: Arc<dyn RelationalStore> = Arc::new(
        PostgresStore::connect_lazy(&args.postgres_config())
            .context("invalid PostgreSQL configuration")?,
    );

    if let Err(err) = documents.ping().await {
        warn!(error = ?err, "MongoDB is unreachable; document queries will fail until it is up");
    }
    if let Err(err) = relational.ping().await {
        warn!(error = ?err, "PostgreSQL is unreachable; table queries will fail until it is up");
    }

    let services = Services::new(documents, relational, &args.gateway_config());
    let mut network = NetworkModule::new(args.network_config(), services);
    let port = network.start().await?;
    info!(version = env!("CARGO_PKG_VERSION"), port, "quarry-server started");

    network.serve(shutdown_signal()).await?;
    info!("quarry-server stopped");
    Ok(())
}
