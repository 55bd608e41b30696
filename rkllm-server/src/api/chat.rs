//! Chat completions endpoint (OpenAI-compatible).

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use rkllm_common::ChatCompletionRequest;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use crate::cache_store::CacheStore;
use crate::error::{Error, Result};
use crate::inference::{GenerateOptions, GenerateOutput};
use crate::normalizer;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/chat/completions", post(chat_completions))
}

async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<axum::response::Response> {
    if request.messages.is_empty() {
        return Err(Error::InvalidRequest("messages must not be empty".to_string()));
    }

    let preferred = request.model.as_deref();
    let engine = state.lifecycle.ensure_loaded(&state.registry, preferred).await?;
    let model_name = engine.model_name().to_string();

    let params = normalizer::resolve_chat_params(&request, &state.config);
    let prompt = normalizer::render_chat_prompt(&request.messages, &state.config.chat_template);
    let save_cache = request.save_cache.clone();
    if save_cache.as_deref() == Some(crate::cache_store::PROTECTED_CACHE_NAME) {
        return Err(Error::CachePathInvalid(format!(
            "the '{}' cache name is reserved",
            crate::cache_store::PROTECTED_CACHE_NAME
        )));
    }
    let cache_path = match save_cache.as_deref() {
        Some(name) => Some(state.cache_store.path(&model_name, name).to_string_lossy().into_owned()),
        None => resolve_cache_path(&state, &model_name, request.use_cache.as_deref()),
    };

    if params.stream {
        let id = format!("chatcmpl-{}", uuid::Uuid::new_v4());
        let created = chrono::Utc::now().timestamp();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();

        let token_tx = tx.clone();
        let token_id = id.clone();
        let token_model = model_name.clone();
        let token_callback: Box<dyn Fn(&str) + Send> = Box::new(move |tok: &str| {
            let chunk = normalizer::chat_chunk_json(&token_id, &token_model, created, tok.to_string());
            let _ = token_tx.send(chunk);
        });

        let options = GenerateOptions {
            max_new_tokens: params.max_new_tokens,
            stop_sequences: params.stop_sequences,
            is_async: true,
            enable_thinking: state.config.model_defaults.enable_thinking,
            cache_path,
            save_cache: save_cache.is_some(),
            token_callback: Some(token_callback),
        };

        let scheduler = state.scheduler.clone();
        let cache_store = state.cache_store.clone();
        let prompt_for_task = prompt.clone();
        let model_for_task = model_name.clone();

        tokio::spawn(async move {
            match scheduler.generate_async(engine, prompt_for_task.clone(), options).await {
                Ok(output) => {
                    if let Some(name) = save_cache.as_deref() {
                        persist_cache_metadata(&cache_store, &model_for_task, name, &prompt_for_task, &output);
                    }
                    let final_chunk = normalizer::chat_final_chunk_json(&id, &model_for_task, created, &output);
                    let _ = tx.send(final_chunk);
                    let _ = tx.send("[DONE]".to_string());
                }
                Err(e) => {
                    tracing::error!(error = %e, "streamed generation failed");
                }
            }
        });

        let stream = UnboundedReceiverStream::new(rx)
            .map(|data| Ok::<Event, Infallible>(Event::default().data(data)));

        Ok(Sse::new(stream)
            .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
            .into_response())
    } else {
        let options = GenerateOptions {
            max_new_tokens: params.max_new_tokens,
            stop_sequences: params.stop_sequences,
            is_async: state.config.model_defaults.is_async,
            enable_thinking: state.config.model_defaults.enable_thinking,
            cache_path,
            save_cache: save_cache.is_some(),
            token_callback: None,
        };

        let output = state.scheduler.generate_async(engine, prompt.clone(), options).await?;

        if let Some(name) = save_cache.as_deref() {
            persist_cache_metadata(&state.cache_store, &model_name, name, &prompt, &output);
        }

        let response = normalizer::chat_response(&model_name, &prompt, &output);
        Ok(Json(response).into_response())
    }
}

fn resolve_cache_path(state: &Arc<AppState>, model_name: &str, use_cache: Option<&str>) -> Option<String> {
    let name = use_cache?;
    if !state.cache_store.exists(model_name, name) {
        tracing::warn!(model = model_name, cache = name, "requested cache not found, proceeding without it");
        return None;
    }
    Some(state.cache_store.path(model_name, name).to_string_lossy().into_owned())
}

pub(crate) fn persist_cache_metadata(
    cache_store: &CacheStore,
    model_name: &str,
    cache_name: &str,
    prompt: &str,
    output: &GenerateOutput,
) {
    let saved = cache_store.save_metadata(
        model_name,
        cache_name,
        prompt.chars().count(),
        "api",
        Some(output.perf.prefill_time_ms as f64),
        chrono::Utc::now().timestamp() as f64,
    );
    if let Err(e) = saved {
        tracing::error!(model = model_name, cache = cache_name, error = %e, "failed to save cache metadata");
    }
}
