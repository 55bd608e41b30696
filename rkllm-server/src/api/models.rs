//! Model listing and lifecycle endpoints (OpenAI-compatible plus admin surface).

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use rkllm_common::{ModelInfo, ModelListResponse, ModelLoadRequest, ModelLoadedResponse};

use crate::error::Result;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/models", get(list_models))
        .route("/models/available", get(list_available))
        .route("/models/loaded", get(loaded_model))
        .route("/models/load", post(load_model))
        .route("/models/unload", post(unload_model))
}

fn descriptors_to_response(registry: &crate::registry::ModelRegistry) -> ModelListResponse {
    let data = registry
        .list()
        .iter()
        .map(|d| ModelInfo::new(d.friendly_name.clone(), d.context_len, d.size_bytes))
        .collect();
    ModelListResponse::new(data)
}

/// GET /v1/models - OpenAI-compatible model list.
async fn list_models(State(state): State<Arc<AppState>>) -> Result<Json<ModelListResponse>> {
    Ok(Json(descriptors_to_response(&state.registry)))
}

/// GET /v1/models/available - same data, named for the admin surface.
async fn list_available(State(state): State<Arc<AppState>>) -> Result<Json<ModelListResponse>> {
    Ok(Json(descriptors_to_response(&state.registry)))
}

/// GET /v1/models/loaded - the currently resident model, if any.
async fn loaded_model(State(state): State<Arc<AppState>>) -> Result<Json<ModelLoadedResponse>> {
    let model_name = state.lifecycle.current().await.map(|e| e.model_name().to_string());
    Ok(Json(ModelLoadedResponse { model_name }))
}

/// POST /v1/models/load - loads a model by friendly name, unloading the
/// current one first if different. Idempotent when already loaded.
async fn load_model(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ModelLoadRequest>,
) -> Result<Json<ModelLoadedResponse>> {
    let engine = state.lifecycle.load(&state.registry, &request.model, request.context_len).await?;
    Ok(Json(ModelLoadedResponse { model_name: Some(engine.model_name().to_string()) }))
}

/// POST /v1/models/unload - drops the resident model, if any.
async fn unload_model(State(state): State<Arc<AppState>>) -> Result<Json<ModelLoadedResponse>> {
    state.lifecycle.unload().await;
    Ok(Json(ModelLoadedResponse { model_name: None }))
}
