//! The unauthenticated health endpoint.
//!
//! `GET /health` reports the gateway's view of its collaborators. The
//! store and the messenger are critical — either failing makes the whole
//! report unhealthy. Service probes are informational: a transiently-down
//! service does not page anyone through this endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use gatehouse_dispatch::Executor;
use gatehouse_messenger::MessengerAdapter;
use gatehouse_store::Store;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Shared state for the health handler.
#[derive(Clone)]
pub struct HealthState {
    /// The durable store (critical).
    pub store: Store,
    /// The messenger adapter (critical).
    pub messenger: Arc<dyn MessengerAdapter>,
    /// The service dispatcher (informational probes).
    pub executor: Arc<Executor>,
}

/// The health report body.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// `healthy` or `unhealthy`.
    pub status: String,
    /// Individual component checks.
    pub checks: HealthChecks,
}

/// Per-component check results.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Durable store check.
    pub store: bool,
    /// Messenger back-end check.
    pub messenger: bool,
    /// Per-service probes.
    pub services: BTreeMap<String, bool>,
}

/// Compute the current health report.
pub async fn health_report(state: &HealthState) -> HealthReport {
    let store = state.store.health_check();
    let messenger = state.messenger.health_check().await;
    let services = state.executor.health_checks().await;

    let status = if store && messenger {
        "healthy"
    } else {
        "unhealthy"
    };

    HealthReport {
        status: status.to_string(),
        checks: HealthChecks {
            store,
            messenger,
            services,
        },
    }
}

async fn health_handler(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let report = health_report(&state).await;
    let code = if report.status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

/// Build the health router.
#[must_use]
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve the health endpoint until shutdown fires.
pub async fn serve(state: HealthState, host: &str, port: u16, shutdown: broadcast::Sender<()>) {
    let listener = match tokio::net::TcpListener::bind((host, port)).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!(port, error = %e, "cannot bind health endpoint");
            return;
        },
    };
    info!(port, "health endpoint listening");

    let mut rx = shutdown.subscribe();
    let server = axum::serve(listener, router(state)).with_graceful_shutdown(async move {
        let _ = rx.recv().await;
    });
    if let Err(e) = server.await {
        warn!(error = %e, "health endpoint failed");
    }
}
