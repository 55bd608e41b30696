//! Shared application state.

use std::sync::Arc;

use crate::cache_store::CacheStore;
use crate::config::Config;
use crate::lifecycle::LifecycleManager;
use crate::registry::ModelRegistry;
use crate::scheduler::Scheduler;

/// Shared application state passed to all handlers.
pub struct AppState {
    pub config: Config,
    pub registry: Arc<ModelRegistry>,
    pub lifecycle: Arc<LifecycleManager>,
    pub cache_store: Arc<CacheStore>,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(
        config: Config,
        registry: Arc<ModelRegistry>,
        lifecycle: Arc<LifecycleManager>,
        cache_store: Arc<CacheStore>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            config,
            registry,
            lifecycle,
            cache_store,
            scheduler,
        }
    }
}
