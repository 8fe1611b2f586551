//! Liveness and readiness probes

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;

use crate::state::AppState;

/// Process is up
pub async fn healthz() -> &'static str {
    "ok"
}

/// Reconciler actor is running
pub async fn readyz(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    if state.reconciler.is_alive() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "reconciler stopped")
    }
}
