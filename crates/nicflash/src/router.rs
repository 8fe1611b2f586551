//! HTTP router configuration

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::api::probes;
use crate::state::AppState;

/// Create the probe router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(probes::healthz))
        .route("/readyz", get(probes::readyz))
        .with_state(state)
}
