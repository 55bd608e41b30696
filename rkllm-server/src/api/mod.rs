//! OpenAI- and Ollama-compatible HTTP API.

pub mod cache;
pub mod chat;
pub mod completions;
pub mod embeddings;
pub mod health;
pub mod models;
pub mod ollama;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// OpenAI-compatible surface, mounted under `/v1`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(chat::router())
        .merge(completions::router())
        .merge(embeddings::router())
        .merge(models::router())
        .merge(cache::router())
        .merge(health::router())
}
