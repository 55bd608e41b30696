//! Health check endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use rkllm_common::HealthResponse;

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

/// GET /v1/health - reports whether a model is currently resident.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let model_name = state.lifecycle.current().await.map(|e| e.model_name().to_string());
    Json(HealthResponse { status: "ok".to_string(), model_name })
}
