//! Embeddings endpoint (OpenAI-compatible, optional surface).

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use rkllm_common::{EmbeddingsRequest, EmbeddingsResponse};

use crate::error::{Error, Result};
use crate::normalizer;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/embeddings", post(embeddings))
}

async fn embeddings(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EmbeddingsRequest>,
) -> Result<Json<EmbeddingsResponse>> {
    if !state.config.embeddings_enabled {
        return Err(Error::EmbeddingsDisabled);
    }

    let inputs = request.input.into_vec();
    if inputs.is_empty() {
        return Err(Error::InvalidRequest("input must not be empty".to_string()));
    }

    let engine = state.lifecycle.ensure_loaded(&state.registry, Some(&request.model)).await?;
    let model_name = engine.model_name().to_string();

    let mut vectors = Vec::with_capacity(inputs.len());
    let mut prompt_tokens = 0u32;
    for text in &inputs {
        prompt_tokens += normalizer::prompt_tokens_estimate(text);
        let (embedding, _perf) = state.scheduler.embed_async(engine.clone(), text.clone()).await?;
        vectors.push(embedding);
    }

    Ok(Json(EmbeddingsResponse::new(model_name, vectors, prompt_tokens)))
}
