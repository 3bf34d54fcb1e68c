//! Background grab loop
//!
//! One named thread per session. Each iteration grabs outside the lock, then
//! under the lock retrieves image-sync detections, fetches the pose and
//! publishes the frame by flipping `new_frame_available`.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use contracts::{DepthCamera, DeviceError, ReferenceFrame, RuntimeParameters, TrackingQuality};
use observability::GrabStatus;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{AcquisitionError, Result};
use crate::shared::SharedAcquisition;

/// Idle sleep when no frame is requested
const IDLE_SLEEP: Duration = Duration::from_millis(1);
/// Back-off after the device disappears
const DISCONNECT_BACKOFF: Duration = Duration::from_millis(10);
/// Back-off after any other grab error
const ERROR_BACKOFF: Duration = Duration::from_millis(1);

/// What one loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStep {
    Idle,
    Paused,
    Grabbed,
    Disconnected,
    EndOfRecording,
    Failed,
}

/// The grab loop of one session.
pub struct AcquisitionLoop {
    shared: Arc<SharedAcquisition>,
    camera: Arc<dyn DepthCamera>,
    runtime: RuntimeParameters,
}

impl AcquisitionLoop {
    pub fn new(
        shared: Arc<SharedAcquisition>,
        camera: Arc<dyn DepthCamera>,
        runtime: RuntimeParameters,
    ) -> Self {
        Self {
            shared,
            camera,
            runtime,
        }
    }

    /// Start the loop on its own thread.
    #[instrument(name = "acquisition_spawn", skip(self), fields(camera_id = %self.shared.camera_id()))]
    pub fn spawn(self) -> Result<AcquisitionHandle> {
        let shared = Arc::clone(&self.shared);
        if shared.set_running(true) {
            return Err(AcquisitionError::AlreadyRunning {
                camera_id: shared.camera_id().to_string(),
            });
        }

        let name = format!("acquisition-{}", shared.camera_id());
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || self.run())
            .map_err(|source| {
                shared.set_running(false);
                AcquisitionError::Spawn { name, source }
            })?;

        info!("acquisition loop started");
        Ok(AcquisitionHandle {
            shared,
            worker: Some(worker),
        })
    }

    fn run(self) {
        while self.shared.is_running() {
            self.step();
        }
        debug!(camera_id = %self.shared.camera_id(), "acquisition loop exited");
    }

    /// One iteration.
    pub fn step(&self) -> LoopStep {
        let requested = self.shared.lock().request_new_frame;
        if !requested || !self.shared.is_ready() {
            thread::sleep(IDLE_SLEEP);
            return LoopStep::Idle;
        }

        if self.shared.is_paused() {
            // Scrubbing a paused recording grabs exactly one frame.
            let single = self.shared.is_recorded() && self.shared.take_single_grab();
            if !single {
                thread::sleep(IDLE_SLEEP);
                return LoopStep::Paused;
            }
        }

        match self.camera.grab(&self.runtime) {
            Ok(()) => {
                self.publish();
                self.shared.metrics().record_grab(GrabStatus::Ok);
                LoopStep::Grabbed
            }
            Err(DeviceError::CameraNotDetected) => {
                if self.shared.mark_disconnected() {
                    warn!(camera_id = %self.shared.camera_id(), "camera not detected during grab");
                }
                self.shared.lock().request_new_frame = false;
                self.shared.metrics().record_grab(GrabStatus::Disconnected);
                thread::sleep(DISCONNECT_BACKOFF);
                LoopStep::Disconnected
            }
            Err(DeviceError::EndOfSvoFile) if self.shared.is_recorded() => {
                if self.shared.mark_end_of_recording() {
                    info!(
                        camera_id = %self.shared.camera_id(),
                        looping = self.shared.loops(),
                        "end of recording reached"
                    );
                    self.shared.metrics().record_grab(GrabStatus::EndOfRecording);
                }
                thread::sleep(ERROR_BACKOFF);
                LoopStep::EndOfRecording
            }
            Err(e) => {
                trace!(camera_id = %self.shared.camera_id(), error = %e, "grab failed");
                self.shared.lock().last_grab_error = Some(e);
                self.shared.metrics().record_grab(GrabStatus::Error);
                thread::sleep(ERROR_BACKOFF);
                LoopStep::Failed
            }
        }
    }

    fn publish(&self) {
        let camera = self.camera.as_ref();
        let timestamp_ns = camera.image_timestamp_ns();
        let position = camera.svo_position();

        let mut state = self.shared.lock();

        if state.objects.image_sync() && !state.objects.frame_ready() {
            state.objects.retrieve(camera);
        }
        if state.bodies.image_sync() && !state.bodies.frame_ready() {
            state.bodies.retrieve(camera);
        }

        if state.tracking.is_active() {
            let (tracking_state, pose) = camera.get_position(ReferenceFrame::World);
            state.tracking.observe(tracking_state);
            state.tracking_state = tracking_state;
            state.pose = pose;
            if self.shared.loops() && state.playback.wrap_origin.is_none() {
                debug!(camera_id = %self.shared.camera_id(), "cached playback wrap origin");
                state.playback.wrap_origin = Some(pose);
            }
            observability::record_tracking_status(
                self.shared.camera_id(),
                match state.tracking.quality() {
                    TrackingQuality::Off => 0,
                    TrackingQuality::Searching => 1,
                    TrackingQuality::Ok => 2,
                },
            );
        }

        state.playback.current = position;
        state.record_grab_timestamp(timestamp_ns);
        state.new_frame_available = true;
        state.request_new_frame = false;

        trace!(
            camera_id = %self.shared.camera_id(),
            timestamp_ns,
            frame = state.frames_grabbed,
            "frame published"
        );
    }
}

/// Owner of a running grab thread; stopping joins it.
#[derive(Debug)]
pub struct AcquisitionHandle {
    shared: Arc<SharedAcquisition>,
    worker: Option<JoinHandle<()>>,
}

impl AcquisitionHandle {
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    pub fn stop(&mut self) {
        self.shared.set_running(false);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(camera_id = %self.shared.camera_id(), "acquisition thread panicked");
            }
            info!(camera_id = %self.shared.camera_id(), "acquisition loop stopped");
        }
    }
}

impl Drop for AcquisitionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
