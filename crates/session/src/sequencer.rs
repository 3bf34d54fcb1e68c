//! Session initialization sequencer
//!
//! `begin` returns immediately. Model optimization, open retries, camera
//! information, the tracking bootstrap and the grab-loop start all run on a
//! `session-init-<camera>` thread; the caller polls `progress()` and
//! collects the outcome once with `try_finish()`.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use acquisition::{AcquisitionHandle, AcquisitionLoop, PlaybackCursor, SharedAcquisition};
use contracts::{
    AiModel, CameraBackend, CameraInformation, DepthCamera, DeviceError, Pose, ReferenceFrame,
    RuntimeParameters, SessionConfig, OPEN_RETRY_FOREVER,
};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use perception::ModelOptimizer;
use tracing::{debug, info, instrument, warn};

use crate::error::{FailureCode, Result, SessionError};

/// Where initialization currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitializationProgress {
    #[default]
    NotStarted,
    /// Building an inference engine; can take minutes
    OptimizingModel { model: AiModel, elapsed_secs: u64 },
    OpeningDevice { attempts: u32 },
    WaitingForTracking,
    Ready,
    Failed(FailureCode),
}

impl InitializationProgress {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InitializationProgress::Ready | InitializationProgress::Failed(_)
        )
    }
}

/// Everything a successful initialization hands to the session.
pub struct OpenedSession {
    pub camera: Arc<dyn DepthCamera>,
    pub information: CameraInformation,
    pub acquisition: AcquisitionHandle,
}

impl OpenedSession {
    /// Stop the grab thread and release the device.
    pub fn shutdown(mut self) {
        self.acquisition.stop();
        self.camera.close();
    }
}

pub struct InitializationSequencer {
    config: SessionConfig,
    backend: Arc<dyn CameraBackend>,
    shared: Arc<SharedAcquisition>,
    origin_override: Option<Pose>,
    progress: Arc<Mutex<InitializationProgress>>,
    cancel: Receiver<()>,
}

impl InitializationSequencer {
    /// Start initializing on a background thread.
    ///
    /// `origin_override` replaces the configured initial tracking pose; it
    /// carries the last known pose across a reconnect.
    #[instrument(name = "session_begin", skip(config, backend, shared), fields(camera_id = %config.camera_id))]
    pub fn begin(
        config: SessionConfig,
        backend: Arc<dyn CameraBackend>,
        shared: Arc<SharedAcquisition>,
        origin_override: Option<Pose>,
    ) -> Result<InitHandle> {
        let progress = Arc::new(Mutex::new(InitializationProgress::NotStarted));
        let (cancel_tx, cancel_rx) = bounded::<()>(0);
        let (result_tx, result_rx) = bounded::<Result<OpenedSession>>(1);

        let name = format!("session-init-{}", config.camera_id);
        let sequencer = Self {
            config,
            backend,
            shared,
            origin_override,
            progress: Arc::clone(&progress),
            cancel: cancel_rx,
        };

        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let outcome = sequencer.run();
                match &outcome {
                    Ok(opened) => info!(
                        camera_id = %sequencer.config.camera_id,
                        serial = opened.information.serial_number,
                        "session initialized"
                    ),
                    Err(e) => {
                        warn!(camera_id = %sequencer.config.camera_id, error = %e, "session initialization failed");
                        sequencer.set_progress(InitializationProgress::Failed(e.code()));
                    }
                }
                // Nobody is waiting anymore: release what was opened.
                if let Err(unsent) = result_tx.send(outcome) {
                    if let Ok(opened) = unsent.into_inner() {
                        opened.shutdown();
                    }
                }
            })
            .map_err(|source| SessionError::Spawn { name, source })?;

        Ok(InitHandle {
            progress,
            result: result_rx,
            cancel: Some(cancel_tx),
            worker: Some(worker),
            started: Instant::now(),
        })
    }

    fn set_progress(&self, progress: InitializationProgress) {
        *self.progress.lock() = progress;
    }

    fn check_cancelled(&self) -> Result<()> {
        match self.cancel.try_recv() {
            Err(TryRecvError::Empty) => Ok(()),
            _ => Err(SessionError::Cancelled),
        }
    }

    fn run(&self) -> Result<OpenedSession> {
        self.optimize_models()?;
        self.check_cancelled()?;

        let camera = self.backend.create_camera(&self.config.input);
        self.open_with_retry(camera.as_ref())?;
        self.finish_open(&camera).inspect_err(|_| camera.close())
    }

    fn optimize_models(&self) -> Result<()> {
        let models = self.config.required_models();
        if models.is_empty() {
            return Ok(());
        }
        let optimizer = ModelOptimizer::new(Arc::clone(&self.backend), &self.config.optimization);
        for model in models {
            self.set_progress(InitializationProgress::OptimizingModel {
                model,
                elapsed_secs: 0,
            });
            optimizer.ensure(model, |elapsed| {
                self.set_progress(InitializationProgress::OptimizingModel {
                    model,
                    elapsed_secs: elapsed.as_secs(),
                })
            })?;
        }
        Ok(())
    }

    /// Retry `open` until it succeeds, fails fatally, the open timeout
    /// expires, or the handle is cancelled.
    fn open_with_retry(&self, camera: &dyn DepthCamera) -> Result<()> {
        let params = self.config.to_init_parameters();
        let timeout = self.config.open_timeout_sec;
        let deadline = (timeout != OPEN_RETRY_FOREVER)
            .then(|| Instant::now() + Duration::from_secs(timeout.max(0) as u64));
        let retry_interval = Duration::from_millis(self.config.recovery.open_retry_interval_ms);

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            self.set_progress(InitializationProgress::OpeningDevice { attempts });

            let source = match camera.open(&params) {
                Ok(()) => {
                    info!(camera_id = %self.config.camera_id, attempts, "camera opened");
                    return Ok(());
                }
                Err(source) => source,
            };

            if source.is_fatal_to_open() {
                return Err(SessionError::OpenFailed { attempts, source });
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(SessionError::OpenFailed { attempts, source });
            }
            debug!(camera_id = %self.config.camera_id, attempts, error = %source, "open failed, retrying");

            match self.cancel.recv_timeout(retry_interval) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => return Err(SessionError::Cancelled),
            }
        }
    }

    fn finish_open(&self, camera: &Arc<dyn DepthCamera>) -> Result<OpenedSession> {
        let information = camera
            .camera_information()
            .map_err(|source| SessionError::CameraInformation { source })?;
        if !information.has_valid_dimensions() {
            return Err(SessionError::CameraNotInitialized {
                width: information.width,
                height: information.height,
            });
        }
        self.shared.lock().playback = PlaybackCursor::new(camera.svo_number_of_frames());

        if self.config.tracking.enabled {
            self.set_progress(InitializationProgress::WaitingForTracking);
            self.bootstrap_tracking(camera)?;
        }
        self.check_cancelled()?;

        let acquisition = AcquisitionLoop::new(
            Arc::clone(&self.shared),
            Arc::clone(camera),
            RuntimeParameters::default(),
        )
        .spawn()?;

        self.shared.set_ready(true);
        self.set_progress(InitializationProgress::Ready);
        Ok(OpenedSession {
            camera: Arc::clone(camera),
            information,
            acquisition,
        })
    }

    /// Enable tracking on its own thread and wait for it, so the first
    /// pose is valid before the session reports ready.
    fn bootstrap_tracking(&self, camera: &Arc<dyn DepthCamera>) -> Result<()> {
        self.shared.lock().tracking.begin_enable()?;

        let params = self.config.to_tracking_parameters(self.origin_override);
        let worker_camera = Arc::clone(camera);
        let name = format!("tracking-bootstrap-{}", self.config.camera_id);
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let result = worker_camera.enable_tracking(&params);
                let position = result
                    .is_ok()
                    .then(|| worker_camera.get_position(ReferenceFrame::World));
                (result, position)
            })
            .map_err(|source| {
                self.shared.lock().tracking.disable();
                SessionError::Spawn { name, source }
            })?;

        let (result, position) = worker
            .join()
            .unwrap_or_else(|_| (Err(DeviceError::Failure), None));

        let mut state = self.shared.lock();
        state
            .tracking
            .complete_enable(result, self.config.tracking.set_as_static)?;
        if let Some((tracking_state, pose)) = position {
            state.tracking.observe(tracking_state);
            state.tracking_state = tracking_state;
            state.pose = pose;
        }
        Ok(())
    }
}

/// Caller-side handle of a running initialization.
pub struct InitHandle {
    progress: Arc<Mutex<InitializationProgress>>,
    result: Receiver<Result<OpenedSession>>,
    cancel: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    started: Instant,
}

impl InitHandle {
    pub fn progress(&self) -> InitializationProgress {
        *self.progress.lock()
    }

    /// Time since `begin`.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The outcome, returned exactly once when initialization is done.
    pub fn try_finish(&mut self) -> Option<Result<OpenedSession>> {
        let outcome = match self.result.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                self.worker.as_ref()?;
                Err(SessionError::Cancelled)
            }
        };
        self.join();
        Some(outcome)
    }

    /// Stop initialization.
    ///
    /// Open retries wake up immediately. A running model optimization cannot
    /// be interrupted, so the thread is detached and cleans up after itself.
    pub fn cancel(&mut self) {
        if self.cancel.take().is_none() {
            return;
        }
        if matches!(self.progress(), InitializationProgress::OptimizingModel { .. }) {
            info!("initialization cancelled during model optimization, detaching");
            self.worker.take();
            self.result = crossbeam_channel::never();
            return;
        }
        self.join();
        if let Ok(Ok(opened)) = self.result.try_recv() {
            opened.shutdown();
        }
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("session init thread panicked");
            }
        }
    }
}

impl Drop for InitHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ObjectDetectionModel;
    use device::{MockBackend, MockBackendConfig, MockCameraConfig, FAIL_FOREVER};

    fn begin(config: SessionConfig, backend: Arc<MockBackend>) -> InitHandle {
        let shared = Arc::new(SharedAcquisition::new(
            config.camera_id.clone(),
            &config.input,
        ));
        InitializationSequencer::begin(config, backend, shared, None).unwrap()
    }

    fn finish(handle: &mut InitHandle) -> Result<OpenedSession> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(outcome) = handle.try_finish() {
                return outcome;
            }
            assert!(Instant::now() < deadline, "initialization did not finish");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn opens_and_reports_ready() {
        let backend = Arc::new(MockBackend::new());
        let mut config = SessionConfig::live("seq");
        config.tracking.enabled = true;
        let mut handle = begin(config, backend.clone());

        let opened = finish(&mut handle).unwrap();
        assert_eq!(handle.progress(), InitializationProgress::Ready);
        assert!(opened.acquisition.is_running());
        assert_eq!(backend.control().tracking_enable_poses().len(), 1);
        opened.shutdown();
        assert_eq!(backend.control().closes(), 1);
    }

    #[test]
    fn zero_timeout_fails_after_one_attempt() {
        let backend = Arc::new(MockBackend::new());
        backend.control().fail_next_opens(FAIL_FOREVER);
        let mut config = SessionConfig::live("seq");
        config.open_timeout_sec = 0;
        let mut handle = begin(config, backend.clone());

        let err = finish(&mut handle).err().unwrap();
        assert!(matches!(err, SessionError::OpenFailed { attempts: 1, .. }));
        assert_eq!(
            handle.progress(),
            InitializationProgress::Failed(FailureCode::OpenFailed)
        );
        assert_eq!(backend.control().open_attempts(), 1);
    }

    #[test]
    fn cancel_interrupts_endless_retry() {
        let backend = Arc::new(MockBackend::new());
        backend.control().fail_next_opens(FAIL_FOREVER);
        let mut handle = begin(SessionConfig::live("seq"), backend.clone());

        thread::sleep(Duration::from_millis(30));
        let started = Instant::now();
        handle.cancel();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(
            handle.progress(),
            InitializationProgress::Failed(FailureCode::Cancelled)
        );
        assert!(backend.control().open_attempts() >= 1);
    }

    #[test]
    fn invalid_dimensions_close_the_camera() {
        let backend = Arc::new(MockBackend::with_config(MockBackendConfig {
            camera: MockCameraConfig {
                report_invalid_dimensions: true,
                ..Default::default()
            },
            ..Default::default()
        }));
        let mut handle = begin(SessionConfig::live("seq"), backend.clone());

        let err = finish(&mut handle).err().unwrap();
        assert!(matches!(err, SessionError::CameraNotInitialized { .. }));
        assert_eq!(backend.control().closes(), 1);
    }

    #[test]
    fn tracking_enable_failure_is_terminal() {
        let backend = Arc::new(MockBackend::new());
        backend.control().set_fail_tracking_enable(true);
        let mut config = SessionConfig::live("seq");
        config.tracking.enabled = true;
        let mut handle = begin(config, backend.clone());

        let err = finish(&mut handle).err().unwrap();
        assert_eq!(err.code(), FailureCode::TrackingFailed);
        assert_eq!(backend.control().closes(), 1);
    }

    #[test]
    fn optimization_timeout_fails_before_open() {
        let backend = Arc::new(MockBackend::with_config(MockBackendConfig {
            optimization_time: Duration::from_millis(500),
            ..Default::default()
        }));
        let mut config = SessionConfig::live("seq");
        config.object_detection.start_on_ready = true;
        config.object_detection.model = ObjectDetectionModel::MultiClassBoxFast;
        config.optimization.timeout_sec = 0;
        config.optimization.poll_interval_ms = 10;
        let mut handle = begin(config, backend.clone());

        let err = finish(&mut handle).err().unwrap();
        assert_eq!(err.code(), FailureCode::OptimizationTimeout);
        assert_eq!(backend.control().open_attempts(), 0);
    }
}
