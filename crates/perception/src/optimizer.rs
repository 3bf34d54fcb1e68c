//! AI model optimization wait
//!
//! `optimize_model` blocks for minutes and cannot be interrupted, so it runs
//! on its own thread while the caller polls with a hard timeout. On timeout
//! the worker is left detached.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use contracts::{AiModel, CameraBackend, DeviceError, OptimizationConfig};
use crossbeam_channel::{bounded, RecvTimeoutError};
use tracing::{info, instrument, warn};

use crate::error::{PerceptionError, Result};

/// Result of [`ModelOptimizer::ensure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationOutcome {
    AlreadyOptimized,
    Optimized { elapsed: Duration },
}

/// Runs model optimization with poll/timeout semantics.
#[derive(Clone)]
pub struct ModelOptimizer {
    backend: Arc<dyn CameraBackend>,
    timeout: Duration,
    poll_interval: Duration,
}

impl ModelOptimizer {
    pub fn new(backend: Arc<dyn CameraBackend>, config: &OptimizationConfig) -> Self {
        Self::with_timing(
            backend,
            Duration::from_secs(config.timeout_sec),
            Duration::from_millis(config.poll_interval_ms),
        )
    }

    pub fn with_timing(
        backend: Arc<dyn CameraBackend>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            backend,
            timeout,
            poll_interval,
        }
    }

    pub fn needs_optimization(&self, model: AiModel) -> bool {
        !self.backend.model_status(model).optimized
    }

    /// Make sure `model` has an optimized engine.
    ///
    /// `on_poll` receives the elapsed time at every poll interval.
    #[instrument(name = "model_optimize", skip(self, on_poll), fields(model = %model))]
    pub fn ensure(
        &self,
        model: AiModel,
        mut on_poll: impl FnMut(Duration),
    ) -> Result<OptimizationOutcome> {
        if !self.needs_optimization(model) {
            return Ok(OptimizationOutcome::AlreadyOptimized);
        }

        info!(
            timeout_secs = self.timeout.as_secs(),
            "model has no optimized engine, optimizing"
        );

        let (tx, rx) = bounded(1);
        let backend = Arc::clone(&self.backend);
        let name = format!("optimize-{model}");
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _ = tx.send(backend.optimize_model(model));
            })
            .map_err(|source| PerceptionError::Spawn { name, source })?;

        let started = Instant::now();
        loop {
            let remaining = self.timeout.saturating_sub(started.elapsed());
            match rx.recv_timeout(self.poll_interval.min(remaining)) {
                Ok(Ok(())) => {
                    let elapsed = started.elapsed();
                    info!(elapsed_secs = elapsed.as_secs_f64(), "model optimized");
                    return Ok(OptimizationOutcome::Optimized { elapsed });
                }
                Ok(Err(source)) => {
                    warn!(error = %source, "model optimization failed");
                    return Err(PerceptionError::OptimizationFailed { model, source });
                }
                Err(RecvTimeoutError::Timeout) => {
                    let elapsed = started.elapsed();
                    if elapsed >= self.timeout {
                        warn!(
                            elapsed_secs = elapsed.as_secs(),
                            "model optimization timed out"
                        );
                        return Err(PerceptionError::OptimizationTimeout {
                            model,
                            timeout_secs: self.timeout.as_secs(),
                        });
                    }
                    info!(
                        elapsed_secs = elapsed.as_secs(),
                        "still optimizing model, this is not a freeze"
                    );
                    on_poll(elapsed);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PerceptionError::OptimizationFailed {
                        model,
                        source: DeviceError::Failure,
                    });
                }
            }
        }
    }
}
