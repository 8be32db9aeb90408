// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Admin HTTP server: liveness, readiness and Prometheus metrics.
//!
//! | Path       | Response                                              |
//! |------------|-------------------------------------------------------|
//! | `/live`    | always `200`                                          |
//! | `/ready`   | `200` once the Link cache has synced, `503` before    |
//! | `/metrics` | Prometheus text exposition of the controller metrics  |

use crate::constants::{ADMIN_LIVENESS_PATH, ADMIN_METRICS_PATH, ADMIN_READINESS_PATH};
use crate::metrics::gather_metrics;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Readiness flag shared with the admin server.
#[derive(Clone, Debug, Default)]
pub struct AdminState {
    ready: Arc<AtomicBool>,
}

impl AdminState {
    /// Creates a state that reports not ready.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the readiness flag.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Returns the readiness flag.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

async fn live() -> StatusCode {
    StatusCode::OK
}

async fn ready(State(state): State<AdminState>) -> StatusCode {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics() -> impl IntoResponse {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Builds the admin routes.
pub fn router(state: AdminState) -> Router {
    Router::new()
        .route(ADMIN_LIVENESS_PATH, get(live))
        .route(ADMIN_READINESS_PATH, get(ready))
        .route(ADMIN_METRICS_PATH, get(metrics))
        .with_state(state)
}

/// Serves the admin routes on `addr` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(
    addr: SocketAddr,
    state: AdminState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Admin server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
#[path = "admin_tests.rs"]
mod admin_tests;
