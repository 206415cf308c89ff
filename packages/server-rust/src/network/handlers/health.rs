//! Root, health, liveness, readiness and database probe handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use tracing::warn;

use super::AppState;
use crate::network::HealthState;

/// Service banner.
pub async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Quarry query gateway is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Returns lifecycle information as JSON.
///
/// Always returns 200; the `state` field tells whether the server is
/// actually serving.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "state": state.shutdown.health_state().as_str(),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe, always 200 while the process answers.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 when ready, 503 while starting, draining or stopped.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

fn connection_label(store: &str, result: anyhow::Result<()>) -> &'static str {
    match result {
        Ok(()) => "connected",
        Err(error) => {
            warn!(store, error = ?error, "database ping failed");
            "disconnected"
        }
    }
}

/// Pings both stores. Always 200; `status` is `degraded` when either is
/// unreachable.
pub async fn database_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (postgres, mongodb) = tokio::join!(
        state.relational.store().ping(),
        state.documents.store().ping()
    );
    let postgres = connection_label("postgres", postgres);
    let mongodb = connection_label("mongodb", mongodb);
    let status = if postgres == "connected" && mongodb == "connected" {
        "healthy"
    } else {
        "degraded"
    };

    Json(json!({
        "status": status,
        "postgres": postgres,
        "mongodb": mongodb,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
