//! Entry point: loads configuration, discovers models, and serves the
//! OpenAI- and Ollama-compatible HTTP surface over a single NPU handle.

use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rkllm_server::{build_router, AppState, CacheStore, Config, LifecycleManager, ModelRegistry, Scheduler};

const GIT_HASH: &str = env!("GIT_HASH");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::args().any(|a| a == "--version" || a == "-V") {
        println!("rkllm-server {} ({})", env!("CARGO_PKG_VERSION"), GIT_HASH);
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().map_err(|e| format!("failed to load configuration: {e}"))?;
    tracing::info!(host = %config.api.host, port = config.api.port, "starting rkllm-server");

    let mut registry = ModelRegistry::new();
    registry.discover(&config.models_dir)?;
    tracing::info!(count = registry.list().len(), dir = %config.models_dir.display(), "discovered models");
    let registry = Arc::new(registry);

    let lifecycle = Arc::new(LifecycleManager::new(config.clone()));
    let cache_store = Arc::new(CacheStore::new(config.cache_dir.clone()));
    let scheduler = Arc::new(Scheduler::new(config.hardware.n_batch));

    let state = Arc::new(AppState::new(config.clone(), registry, lifecycle, cache_store, scheduler));

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let app = build_router(state).layer(cors);

    let addr = format!("{}:{}", config.api.host, config.api.port);
    tracing::info!(%addr, "listening");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
