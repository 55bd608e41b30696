//! Ollama-compatible surface (`/api/generate`, `/api/chat`, `/api/tags`).
//!
//! Shares the same lifecycle manager, scheduler, and engine as the OpenAI
//! surface in [`super::chat`] and [`super::completions`] — one queue across
//! both wire protocols.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use rkllm_common::{
    OllamaChatRequest, OllamaChatResponse, OllamaGenerateRequest, OllamaGenerateResponse, OllamaTagModel,
    OllamaTagsResponse,
};

use crate::error::{Error, Result};
use crate::inference::GenerateOptions;
use crate::normalizer;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/generate", post(generate))
        .route("/chat", post(chat))
        .route("/tags", get(tags))
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OllamaGenerateRequest>,
) -> Result<Json<OllamaGenerateResponse>> {
    if request.prompt.trim().is_empty() {
        return Err(Error::InvalidRequest("prompt must not be empty".to_string()));
    }

    let engine = state.lifecycle.ensure_loaded(&state.registry, Some(&request.model)).await?;
    let model_name = engine.model_name().to_string();

    let params = normalizer::resolve_ollama_generate_params(&request, &state.config);
    let prompt = request.prompt.clone();

    let options = GenerateOptions {
        max_new_tokens: params.max_new_tokens,
        stop_sequences: params.stop_sequences,
        is_async: state.config.model_defaults.is_async,
        enable_thinking: state.config.model_defaults.enable_thinking,
        cache_path: None,
        save_cache: false,
        token_callback: None,
    };

    let output = state.scheduler.generate_async(engine, prompt.clone(), options).await?;
    Ok(Json(normalizer::ollama_generate_response(&model_name, &prompt, &output)))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OllamaChatRequest>,
) -> Result<Json<OllamaChatResponse>> {
    if request.messages.is_empty() {
        return Err(Error::InvalidRequest("messages must not be empty".to_string()));
    }

    let engine = state.lifecycle.ensure_loaded(&state.registry, Some(&request.model)).await?;
    let model_name = engine.model_name().to_string();

    let params = normalizer::resolve_ollama_chat_params(&request, &state.config);
    let prompt = normalizer::render_chat_prompt(&request.messages, &state.config.chat_template);

    let options = GenerateOptions {
        max_new_tokens: params.max_new_tokens,
        stop_sequences: params.stop_sequences,
        is_async: state.config.model_defaults.is_async,
        enable_thinking: state.config.model_defaults.enable_thinking,
        cache_path: None,
        save_cache: false,
        token_callback: None,
    };

    let output = state.scheduler.generate_async(engine, prompt, options).await?;
    Ok(Json(normalizer::ollama_chat_response(&model_name, &output)))
}

async fn tags(State(state): State<Arc<AppState>>) -> Result<Json<OllamaTagsResponse>> {
    let models = state
        .registry
        .list()
        .iter()
        .map(|d| OllamaTagModel {
            name: d.friendly_name.clone(),
            size: Some(d.size_bytes),
            modified_at: None,
        })
        .collect();
    Ok(Json(OllamaTagsResponse { models }))
}
