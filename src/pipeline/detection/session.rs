//! Image selection with stale-run cancellation.
//!
//! Selecting a new image cancels whatever run is still in flight for the
//! previous one. A superseded run resolves to `DetectionError::Cancelled`
//! even if its provider calls completed, so a stale report can never
//! replace a newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use super::coordinator::DetectionCoordinator;
use super::types::{DetectionReport, ImageInput};
use super::DetectionError;

pub struct DetectionSession {
    coordinator: Arc<DetectionCoordinator>,
    current: Mutex<Option<CancellationToken>>,
    generation: AtomicU64,
}

impl DetectionSession {
    pub fn new(coordinator: Arc<DetectionCoordinator>) -> Self {
        Self {
            coordinator,
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Run detection for a newly selected image, superseding any earlier run.
    ///
    /// Provider clients are blocking, so the run executes on the blocking pool.
    pub async fn select_image(
        &self,
        image: ImageInput,
        hour: u32,
    ) -> Result<DetectionReport, DetectionError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();

        {
            let mut current = self
                .current
                .lock()
                .map_err(|_| DetectionError::Task("session lock poisoned".into()))?;
            if let Some(previous) = current.replace(token.clone()) {
                tracing::info!(generation, "New image selected, cancelling previous run");
                previous.cancel();
            }
        }

        let coordinator = Arc::clone(&self.coordinator);
        let run_token = token.clone();
        let result = tokio::task::spawn_blocking(move || coordinator.run(&image, hour, &run_token))
            .await
            .map_err(|e| DetectionError::Task(e.to_string()))?;

        if token.is_cancelled() || self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(generation, "Discarding superseded detection result");
            return Err(DetectionError::Cancelled);
        }

        result
    }

    /// Cancel the in-flight run, if any, without starting a new one.
    pub fn cancel_current(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(token) = current.take() {
                token.cancel();
            }
        }
    }
}
