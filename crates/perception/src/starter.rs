//! Asynchronous pipeline start
//!
//! Starting a pipeline may need a multi-minute model optimization. The
//! starter runs optimization and enable on a helper thread, forcing playback
//! pause for the duration of the optimization, and hands the result back
//! through `poll()` on the consumer tick.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use contracts::{DepthCamera, DeviceError};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use tracing::{info, warn};

use crate::error::{PerceptionError, Result};
use crate::optimizer::ModelOptimizer;
use crate::pipeline::Pipeline;

/// Playback pause control used while a model is being optimized.
pub trait PlaybackGate: Send + Sync {
    /// Force pause on, returning whether playback was already paused.
    fn force_pause(&self) -> bool;

    /// Undo one `force_pause`.
    fn restore_pause(&self, previous: bool);
}

struct PendingStart<P: Pipeline> {
    worker: JoinHandle<()>,
    result: Receiver<Result<P::Params>>,
}

/// One in-flight start per pipeline.
pub struct PipelineStarter<P: Pipeline> {
    starting: Arc<AtomicBool>,
    pending: Option<PendingStart<P>>,
    _pipeline: PhantomData<P>,
}

impl<P: Pipeline> Default for PipelineStarter<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Pipeline> PipelineStarter<P> {
    pub fn new() -> Self {
        Self {
            starting: Arc::new(AtomicBool::new(false)),
            pending: None,
            _pipeline: PhantomData,
        }
    }

    pub fn is_starting(&self) -> bool {
        self.starting.load(Ordering::SeqCst)
    }

    /// Begin starting the pipeline; rejected while a start is in flight.
    pub fn start(
        &mut self,
        camera: Arc<dyn DepthCamera>,
        optimizer: ModelOptimizer,
        gate: Arc<dyn PlaybackGate>,
        params: P::Params,
    ) -> Result<()> {
        if self
            .starting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(pipeline = P::NAME, "start rejected, already starting");
            return Err(PerceptionError::AlreadyStarting { pipeline: P::NAME });
        }

        let (tx, rx) = bounded(1);
        let name = format!("start-{}", P::NAME);
        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            let _ = tx.send(run_start::<P>(camera.as_ref(), &optimizer, gate.as_ref(), params));
        });

        match spawned {
            Ok(worker) => {
                self.pending = Some(PendingStart { worker, result: rx });
                Ok(())
            }
            Err(source) => {
                self.starting.store(false, Ordering::SeqCst);
                Err(PerceptionError::Spawn { name, source })
            }
        }
    }

    /// Completed start, returned exactly once.
    pub fn poll(&mut self) -> Option<Result<P::Params>> {
        let pending = self.pending.as_ref()?;
        let result = match pending.result.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(PerceptionError::EnableFailed {
                pipeline: P::NAME,
                source: DeviceError::Failure,
            }),
        };
        if let Some(pending) = self.pending.take() {
            let _ = pending.worker.join();
        }
        self.starting.store(false, Ordering::SeqCst);
        Some(result)
    }

    /// Block until the in-flight start finishes.
    pub fn wait(&mut self) -> Option<Result<P::Params>> {
        let pending = self.pending.take()?;
        let result = pending.result.recv().unwrap_or(Err(PerceptionError::EnableFailed {
            pipeline: P::NAME,
            source: DeviceError::Failure,
        }));
        let _ = pending.worker.join();
        self.starting.store(false, Ordering::SeqCst);
        Some(result)
    }
}

fn run_start<P: Pipeline>(
    camera: &dyn DepthCamera,
    optimizer: &ModelOptimizer,
    gate: &dyn PlaybackGate,
    params: P::Params,
) -> Result<P::Params> {
    if let Some(model) = P::model(&params).filter(|m| optimizer.needs_optimization(*m)) {
        let was_paused = gate.force_pause();
        let outcome = optimizer.ensure(model, |_| {});
        gate.restore_pause(was_paused);
        outcome?;
    }

    P::enable(camera, &params).map_err(|source| PerceptionError::EnableFailed {
        pipeline: P::NAME,
        source,
    })?;
    info!(pipeline = P::NAME, "pipeline enabled");
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{BodyTracking, ObjectDetection};
    use contracts::{
        BodyTrackingParameters, CameraBackend, ObjectDetectionParameters, SessionConfig,
    };
    use device::{MockBackend, MockBackendConfig};
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct RecordingGate {
        paused: AtomicBool,
        history: Mutex<Vec<bool>>,
    }

    impl PlaybackGate for RecordingGate {
        fn force_pause(&self) -> bool {
            self.history.lock().push(true);
            self.paused.swap(true, Ordering::SeqCst)
        }

        fn restore_pause(&self, previous: bool) {
            self.history.lock().push(previous);
            self.paused.store(previous, Ordering::SeqCst);
        }
    }

    fn setup(config: MockBackendConfig) -> (Arc<dyn DepthCamera>, ModelOptimizer) {
        let backend = Arc::new(MockBackend::with_config(config));
        let input = SessionConfig::live("starter").input;
        let camera = backend.create_camera(&input);
        camera
            .open(&SessionConfig::live("starter").to_init_parameters())
            .unwrap();
        let optimizer =
            ModelOptimizer::with_timing(backend, Duration::from_secs(5), Duration::from_millis(5));
        (camera, optimizer)
    }

    fn poll_until<P: Pipeline>(starter: &mut PipelineStarter<P>) -> Result<P::Params> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(result) = starter.poll() {
                return result;
            }
            assert!(Instant::now() < deadline, "start did not finish");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn duplicate_start_is_rejected() {
        let (camera, optimizer) = setup(MockBackendConfig {
            optimization_time: Duration::from_millis(50),
            ..Default::default()
        });
        let gate: Arc<dyn PlaybackGate> = Arc::new(RecordingGate::default());
        let mut starter = PipelineStarter::<ObjectDetection>::new();

        starter
            .start(
                camera.clone(),
                optimizer.clone(),
                gate.clone(),
                ObjectDetectionParameters::default(),
            )
            .unwrap();
        assert!(starter.is_starting());
        assert!(matches!(
            starter.start(camera, optimizer, gate, ObjectDetectionParameters::default()),
            Err(PerceptionError::AlreadyStarting { .. })
        ));

        poll_until(&mut starter).unwrap();
        assert!(!starter.is_starting());
        assert!(starter.poll().is_none());
    }

    #[test]
    fn optimization_forces_and_restores_pause() {
        let (camera, optimizer) = setup(MockBackendConfig::default());
        let gate = Arc::new(RecordingGate::default());
        let mut starter = PipelineStarter::<BodyTracking>::new();

        starter
            .start(camera, optimizer, gate.clone(), BodyTrackingParameters::default())
            .unwrap();
        poll_until(&mut starter).unwrap();

        assert_eq!(*gate.history.lock(), vec![true, false]);
        assert!(!gate.paused.load(Ordering::SeqCst));
    }

    #[test]
    fn optimized_model_skips_pause() {
        let params = BodyTrackingParameters::default();
        let (camera, optimizer) = setup(MockBackendConfig {
            optimized_models: vec![params.ai_model()],
            ..Default::default()
        });
        let gate = Arc::new(RecordingGate::default());
        let mut starter = PipelineStarter::<BodyTracking>::new();

        starter.start(camera, optimizer, gate.clone(), params).unwrap();
        assert!(starter.wait().unwrap().is_ok());
        assert!(gate.history.lock().is_empty());
    }
}
