//! Legacy text completions endpoint (OpenAI-compatible).

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use rkllm_common::CompletionRequest;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use crate::error::{Error, Result};
use crate::inference::GenerateOptions;
use crate::normalizer;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/completions", post(completions))
}

async fn completions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CompletionRequest>,
) -> Result<axum::response::Response> {
    if request.prompt.trim().is_empty() {
        return Err(Error::InvalidRequest("prompt must not be empty".to_string()));
    }

    let preferred = request.model.as_deref();
    let engine = state.lifecycle.ensure_loaded(&state.registry, preferred).await?;
    let model_name = engine.model_name().to_string();

    let params = normalizer::resolve_completion_params(&request, &state.config);
    let prompt = request.prompt.clone();

    if params.stream {
        let id = format!("cmpl-{}", uuid::Uuid::new_v4());
        let created = chrono::Utc::now().timestamp();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();

        let token_tx = tx.clone();
        let token_id = id.clone();
        let token_model = model_name.clone();
        let token_callback: Box<dyn Fn(&str) + Send> = Box::new(move |tok: &str| {
            let chunk = normalizer::completion_chunk_json(&token_id, &token_model, created, tok.to_string());
            let _ = token_tx.send(chunk);
        });

        let options = GenerateOptions {
            max_new_tokens: params.max_new_tokens,
            stop_sequences: params.stop_sequences,
            is_async: true,
            enable_thinking: state.config.model_defaults.enable_thinking,
            cache_path: None,
            save_cache: false,
            token_callback: Some(token_callback),
        };

        let scheduler = state.scheduler.clone();
        let model_for_task = model_name.clone();

        tokio::spawn(async move {
            match scheduler.generate_async(engine, prompt, options).await {
                Ok(output) => {
                    let final_chunk = normalizer::completion_final_chunk_json(&id, &model_for_task, created, &output);
                    let _ = tx.send(final_chunk);
                    let _ = tx.send("[DONE]".to_string());
                }
                Err(e) => {
                    tracing::error!(error = %e, "streamed completion failed");
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
            cache_path: None,
            save_cache: false,
            token_callback: None,
        };

        let output = state.scheduler.generate_async(engine, prompt.clone(), options).await?;
        let response = normalizer::completion_response(&model_name, &prompt, &output);
        Ok(Json(response).into_response())
    }
}
