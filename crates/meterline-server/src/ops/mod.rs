//! HTTP endpoints.
//!
//! - `/health`  : liveness, JSON `{"status":"ok"}`
//! - `/hello`   : greeting, JSON `{"message":"Hello DevOps"}`
//! - `/readyz`  : readiness (503 when draining)
//! - `/metrics` : Prometheus text format

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use meterline_core::expo::CONTENT_TYPE;

use crate::app_state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn hello() -> impl IntoResponse {
    Json(json!({ "message": "Hello DevOps" }))
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if state.is_draining() {
        (StatusCode::SERVICE_UNAVAILABLE, "draining")
    } else {
        (StatusCode::OK, "ready")
    }
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let body = state.metrics().render();

    (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
}
