//! Shared acquisition state
//!
//! One coarse `parking_lot::Mutex` guards everything the grab thread and the
//! consumer both touch; it is held for flag flips and buffer copies only.
//! Run/ready/disconnect/pause signals are lock-free atomics.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use contracts::{CameraId, DeviceError, InputKind, InputSource, Pose, PositionalTrackingState};
use parking_lot::{Mutex, MutexGuard};
use perception::{BodyTracking, DetectionBroker, ObjectDetection, PlaybackGate};

use crate::metrics::AcquisitionMetrics;
use crate::playback::PlaybackCursor;
use crate::tracking::TrackingStateMachine;

/// EMA weight of the previous grab-rate estimate
const GRAB_FPS_SMOOTHING: f32 = 0.9;

/// State behind the coarse lock.
///
/// `request_new_frame` is only ever set by the consumer and
/// `new_frame_available` only by the grab thread.
#[derive(Debug)]
pub struct SharedState {
    pub request_new_frame: bool,
    pub new_frame_available: bool,

    /// Capture timestamp of the last successful grab
    pub grab_timestamp_ns: u64,
    pub frames_grabbed: u64,
    /// Last transient grab failure; taken by the consumer with the next frame
    pub last_grab_error: Option<DeviceError>,
    pub grab_fps: f32,

    pub tracking: TrackingStateMachine,
    pub pose: Pose,
    pub tracking_state: PositionalTrackingState,

    pub playback: PlaybackCursor,

    pub objects: DetectionBroker<ObjectDetection>,
    pub bodies: DetectionBroker<BodyTracking>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            request_new_frame: true,
            new_frame_available: false,
            grab_timestamp_ns: 0,
            frames_grabbed: 0,
            last_grab_error: None,
            grab_fps: 0.0,
            tracking: TrackingStateMachine::new(),
            pose: Pose::identity(),
            tracking_state: PositionalTrackingState::Off,
            playback: PlaybackCursor::default(),
            objects: DetectionBroker::default(),
            bodies: DetectionBroker::default(),
        }
    }

    pub(crate) fn record_grab_timestamp(&mut self, timestamp_ns: u64) {
        if self.grab_timestamp_ns > 0 && timestamp_ns > self.grab_timestamp_ns {
            let instant = 1e9 / (timestamp_ns - self.grab_timestamp_ns) as f32;
            self.grab_fps = if self.grab_fps > 0.0 {
                GRAB_FPS_SMOOTHING * self.grab_fps + (1.0 - GRAB_FPS_SMOOTHING) * instant
            } else {
                instant
            };
        }
        self.grab_timestamp_ns = timestamp_ns;
        self.frames_grabbed += 1;
    }
}

/// State shared by the grab thread and the consumer of one session.
#[derive(Debug)]
pub struct SharedAcquisition {
    camera_id: CameraId,
    input_kind: InputKind,
    loops: bool,
    state: Mutex<SharedState>,
    running: AtomicBool,
    ready: AtomicBool,
    disconnected: AtomicBool,
    paused: AtomicBool,
    /// Outstanding pipeline starts holding playback paused
    forced_pauses: AtomicU32,
    grab_one_frame: AtomicBool,
    end_of_recording: AtomicBool,
    metrics: AcquisitionMetrics,
}

impl SharedAcquisition {
    pub fn new(camera_id: CameraId, input: &InputSource) -> Self {
        Self {
            metrics: AcquisitionMetrics::new(camera_id.clone()),
            camera_id,
            input_kind: input.kind(),
            loops: input.loops(),
            state: Mutex::new(SharedState::new()),
            running: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            forced_pauses: AtomicU32::new(0),
            grab_one_frame: AtomicBool::new(false),
            end_of_recording: AtomicBool::new(false),
        }
    }

    pub fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    pub fn is_recorded(&self) -> bool {
        self.input_kind == InputKind::RecordedFile
    }

    /// Recorded input with loop playback.
    pub fn loops(&self) -> bool {
        self.loops
    }

    /// Acquire the coarse lock.
    pub fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock()
    }

    pub fn metrics(&self) -> &AcquisitionMetrics {
        &self.metrics
    }

    // ===== Lifecycle =====

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    // ===== Disconnect =====

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_disconnected(&self) -> bool {
        !self.disconnected.swap(true, Ordering::SeqCst)
    }

    /// Take the disconnect flag, returning whether it was set.
    pub fn take_disconnected(&self) -> bool {
        self.disconnected.swap(false, Ordering::SeqCst)
    }

    // ===== Playback =====

    /// Paused by the user or, for recorded input, by an in-flight pipeline start.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst) || self.forced_pauses.load(Ordering::SeqCst) > 0
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub(crate) fn request_single_grab(&self) {
        self.grab_one_frame.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_single_grab(&self) -> bool {
        self.grab_one_frame.swap(false, Ordering::SeqCst)
    }

    pub fn is_end_of_recording(&self) -> bool {
        self.end_of_recording.load(Ordering::SeqCst)
    }

    /// Returns `true` the first time the end is reached.
    pub(crate) fn mark_end_of_recording(&self) -> bool {
        !self.end_of_recording.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn clear_end_of_recording(&self) {
        self.end_of_recording.store(false, Ordering::SeqCst);
    }
}

/// Forced pauses nest and leave the user's pause flag alone. Only recorded
/// input is held; a live camera keeps grabbing while a model is optimized.
impl PlaybackGate for SharedAcquisition {
    fn force_pause(&self) -> bool {
        let was_paused = self.is_paused();
        if self.is_recorded() {
            self.forced_pauses.fetch_add(1, Ordering::SeqCst);
        }
        was_paused
    }

    fn restore_pause(&self, _previous: bool) {
        if self.is_recorded() {
            let _ = self
                .forced_pauses
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        }
    }
}
