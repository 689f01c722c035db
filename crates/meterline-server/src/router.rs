//! Axum router wiring.
//!
//! Every route, `/metrics` included, runs behind the instrumentation layer.

use axum::{routing::get, Router};

use crate::{app_state::AppState, middleware::InstrumentLayer, ops};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(ops::health))
        .route("/hello", get(ops::hello))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .layer(InstrumentLayer::new(state.metrics()))
        .with_state(state)
}
