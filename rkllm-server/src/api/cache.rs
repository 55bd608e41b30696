//! Binary prompt-cache CRUD endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use rkllm_common::{AllCachesResponse, CacheListResponse, CacheSaveRequest, CacheSaveResponse};

use crate::cache_store::PROTECTED_CACHE_NAME;
use crate::error::{Error, Forbidden, Result};
use crate::inference::GenerateOptions;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cache", get(list_all_caches))
        .route("/cache/:model", get(list_model_caches).post(save_cache))
        .route("/cache/:model/:name", get(cache_info).delete(delete_cache))
}

async fn list_all_caches(State(state): State<Arc<AppState>>) -> Result<Json<AllCachesResponse>> {
    let models = state.cache_store.list_all()?;
    Ok(Json(AllCachesResponse { models }))
}

async fn list_model_caches(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
) -> Result<Json<CacheListResponse>> {
    let caches = state.cache_store.list(&model)?;
    Ok(Json(CacheListResponse { model_name: model, caches }))
}

async fn cache_info(
    State(state): State<Arc<AppState>>,
    Path((model, name)): Path<(String, String)>,
) -> Result<Json<rkllm_common::CacheInfo>> {
    state
        .cache_store
        .info(&model, &name)?
        .map(Json)
        .ok_or_else(|| Error::CacheMissing(format!("{model}/{name}")))
}

/// POST /v1/cache/{model} - runs the given prompt through the model with
/// prompt-cache saving enabled, producing a reusable binary prefix blob.
async fn save_cache(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
    Json(request): Json<CacheSaveRequest>,
) -> Result<Json<CacheSaveResponse>> {
    if request.prompt.trim().is_empty() {
        return Err(Error::InvalidRequest("prompt must not be empty".to_string()));
    }
    crate::cache_store::CacheStore::validate_name(&request.cache_name)?;
    if request.cache_name == PROTECTED_CACHE_NAME {
        return Err(Error::CachePathInvalid(format!(
            "the '{PROTECTED_CACHE_NAME}' cache name is reserved"
        )));
    }

    let engine = state.lifecycle.ensure_loaded(&state.registry, Some(&model)).await?;
    let model_name = engine.model_name().to_string();
    let cache_path = state.cache_store.path(&model_name, &request.cache_name).to_string_lossy().into_owned();

    let options = GenerateOptions {
        max_new_tokens: state.config.model_defaults.max_new_tokens,
        stop_sequences: Vec::new(),
        is_async: state.config.model_defaults.is_async,
        enable_thinking: state.config.model_defaults.enable_thinking,
        cache_path: Some(cache_path.clone()),
        save_cache: true,
        token_callback: None,
    };

    let output = state.scheduler.generate_async(engine, request.prompt.clone(), options).await?;

    if !state.cache_store.exists(&model_name, &request.cache_name) {
        return Err(Error::SaveCacheFailed(format!(
            "no cache blob appeared at {cache_path} after a save-flagged generation"
        )));
    }

    let source = request.source.clone().unwrap_or_else(|| "api".to_string());
    state.cache_store.save_metadata(
        &model_name,
        &request.cache_name,
        request.prompt.chars().count(),
        &source,
        Some(output.perf.prefill_time_ms as f64),
        chrono::Utc::now().timestamp() as f64,
    )?;

    let size_bytes = std::fs::metadata(&cache_path).map(|m| m.len()).unwrap_or(0);
    Ok(Json(CacheSaveResponse {
        cache_name: request.cache_name,
        model_name,
        size_mb: size_bytes as f64 / (1024.0 * 1024.0),
    }))
}

async fn delete_cache(
    State(state): State<Arc<AppState>>,
    Path((model, name)): Path<(String, String)>,
) -> std::result::Result<Json<serde_json::Value>, DeleteCacheError> {
    if name == PROTECTED_CACHE_NAME {
        return Err(DeleteCacheError::Forbidden(Forbidden(format!(
            "the '{PROTECTED_CACHE_NAME}' cache is protected and cannot be deleted"
        ))));
    }
    let deleted = state.cache_store.delete(&model, &name).map_err(DeleteCacheError::Error)?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

enum DeleteCacheError {
    Forbidden(Forbidden),
    Error(Error),
}

impl axum::response::IntoResponse for DeleteCacheError {
    fn into_response(self) -> axum::response::Response {
        match self {
            DeleteCacheError::Forbidden(f) => f.into_response(),
            DeleteCacheError::Error(e) => e.into_response(),
        }
    }
}
