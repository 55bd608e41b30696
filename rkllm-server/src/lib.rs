//! OpenAI- and Ollama-compatible inference server for a single on-device
//! NPU running RKLLM models. Exposed as a library so integration tests can
//! build routers directly against real handlers.

pub mod api;
pub mod cache_store;
pub mod config;
pub mod error;
pub mod ffi;
pub mod inference;
pub mod lifecycle;
pub mod logging;
pub mod normalizer;
pub mod registry;
pub mod scheduler;
pub mod state;

pub use cache_store::CacheStore;
pub use config::Config;
pub use error::{Error, Result};
pub use lifecycle::LifecycleManager;
pub use registry::ModelRegistry;
pub use scheduler::Scheduler;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;

/// Assembles the full HTTP router: OpenAI surface under `/v1`, Ollama
/// surface under `/api`, wrapped in request logging.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/v1", api::router())
        .nest("/api", api::ollama::router())
        .layer(axum::middleware::from_fn(logging::request_logger))
        .with_state(state)
}
