//! Model Lifecycle Manager: a single mutex-guarded slot holding at most one
//! loaded engine at a time, swapped in and out on request.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::inference::RkllmEngine;
use crate::registry::ModelRegistry;

pub struct LifecycleManager {
    config: Config,
    current: Mutex<Option<Arc<RkllmEngine>>>,
}

impl LifecycleManager {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            current: Mutex::new(None),
        }
    }

    pub fn current_blocking(&self) -> Option<Arc<RkllmEngine>> {
        self.current.blocking_lock().clone()
    }

    pub async fn current(&self) -> Option<Arc<RkllmEngine>> {
        self.current.lock().await.clone()
    }

    /// Loads `friendly_name` from `registry`, unloading whatever is
    /// currently resident first. Idempotent: loading the model that is
    /// already loaded is a no-op. `requested_context_len`, if given, is
    /// clamped down to the descriptor's detected context length.
    pub async fn load(
        &self,
        registry: &ModelRegistry,
        friendly_name: &str,
        requested_context_len: Option<u32>,
    ) -> Result<Arc<RkllmEngine>> {
        let descriptor = registry
            .lookup(friendly_name)
            .ok_or_else(|| Error::ModelNotFound(friendly_name.to_string()))?
            .clone();

        let mut slot = self.current.lock().await;
        if let Some(existing) = slot.as_ref() {
            if existing.model_name().eq_ignore_ascii_case(&descriptor.friendly_name) {
                return Ok(existing.clone());
            }
            tracing::info!(model = existing.model_name(), "unloading current model before switch");
            *slot = None;
        }

        let path = descriptor.path.to_string_lossy().into_owned();
        let friendly_name = descriptor.friendly_name.clone();
        let context_len = match requested_context_len {
            Some(requested) if requested > descriptor.context_len => {
                tracing::warn!(
                    model = %friendly_name,
                    requested,
                    max = descriptor.context_len,
                    "requested context_len exceeds model's detected context, clamping"
                );
                descriptor.context_len
            }
            Some(requested) => requested,
            None => descriptor.context_len,
        };
        let config = self.config.clone();

        let engine = tokio::task::spawn_blocking(move || {
            RkllmEngine::load(&path, &friendly_name, context_len, &config)
        })
        .await
        .map_err(|e| Error::Internal(format!("model load task panicked: {e}")))??;

        let engine = Arc::new(engine);
        *slot = Some(engine.clone());
        Ok(engine)
    }

    /// Drops the resident engine, triggering `rkllm_destroy` via `Drop`.
    /// Safe to call with nothing loaded; only meant to run at shutdown or
    /// ahead of a `load` swap, never mid-request.
    pub async fn unload(&self) -> bool {
        let mut slot = self.current.lock().await;
        slot.take().is_some()
    }

    /// Loads `preferred_name` if given and registered, otherwise the
    /// smallest available model, unless something is already resident.
    pub async fn ensure_loaded(
        &self,
        registry: &ModelRegistry,
        preferred_name: Option<&str>,
    ) -> Result<Arc<RkllmEngine>> {
        if let Some(engine) = self.current().await {
            return Ok(engine);
        }

        let target = match preferred_name {
            Some(name) if registry.lookup(name).is_some() => name.to_string(),
            _ => registry
                .list()
                .first()
                .map(|m| m.friendly_name.clone())
                .ok_or(Error::NoModelLoaded)?,
        };

        self.load(registry, &target, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_loaded_with_no_models_returns_no_model_loaded() {
        let manager = LifecycleManager::new(Config::default());
        let registry = ModelRegistry::new();
        let result = manager.ensure_loaded(&registry, None).await;
        assert!(matches!(result, Err(Error::NoModelLoaded)));
    }

    #[tokio::test]
    async fn test_load_unknown_model_returns_model_not_found() {
        let manager = LifecycleManager::new(Config::default());
        let registry = ModelRegistry::new();
        let result = manager.load(&registry, "nonexistent", None).await;
        assert!(matches!(result, Err(Error::ModelNotFound(_))));
    }

    #[tokio::test]
    async fn test_unload_with_nothing_loaded_returns_false() {
        let manager = LifecycleManager::new(Config::default());
        assert!(!manager.unload().await);
    }
}
