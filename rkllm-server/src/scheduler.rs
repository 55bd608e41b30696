//! Batch Scheduler: gates concurrent access to the single NPU handle with a
//! counting semaphore sized to the configured batch width.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;

use crate::error::{Error, Result};
use crate::inference::{GenerateOptions, GenerateOutput, RkllmEngine};

/// How long a permit wait has to take before it's worth logging.
const SLOW_WAIT_WARN: std::time::Duration = std::time::Duration::from_millis(500);

pub struct Scheduler {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl Scheduler {
    pub fn new(n_batch: usize) -> Self {
        let capacity = n_batch.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Permits currently free. Purely observational.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Acquires a permit, runs the blocking `generate` call on a worker
    /// thread, and releases the permit when it completes either way.
    pub async fn generate_async(
        &self,
        engine: Arc<RkllmEngine>,
        prompt: String,
        options: GenerateOptions,
    ) -> Result<GenerateOutput> {
        let wait_start = Instant::now();
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("scheduler semaphore closed".to_string()))?;
        let waited = wait_start.elapsed();
        if waited > SLOW_WAIT_WARN {
            tracing::warn!(waited_ms = waited.as_millis() as u64, "long wait for a batch permit");
        }

        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            engine.generate(&prompt, options)
        })
        .await
        .map_err(|e| Error::Internal(format!("generation task panicked: {e}")))?;

        result
    }

    /// Same permit-gating as `generate_async`, for the embeddings path.
    pub async fn embed_async(
        &self,
        engine: Arc<RkllmEngine>,
        text: String,
    ) -> Result<(Vec<f32>, crate::ffi::RkllmPerfStat)> {
        let wait_start = Instant::now();
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("scheduler semaphore closed".to_string()))?;
        let waited = wait_start.elapsed();
        if waited > SLOW_WAIT_WARN {
            tracing::warn!(waited_ms = waited.as_millis() as u64, "long wait for a batch permit");
        }

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            engine.embed(&text)
        })
        .await
        .map_err(|e| Error::Internal(format!("embedding task panicked: {e}")))?
    }
}
