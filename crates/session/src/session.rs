//! Camera session orchestrator
//!
//! `CameraSession` owns one camera for its whole lifetime: initialization,
//! the per-tick frame handoff, detection pipelines, tracking commands,
//! playback control and disconnect recovery. Every method runs on the
//! caller's thread and never blocks on `grab()`; only `reboot()` and
//! stopping a pipeline that is still starting wait.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use acquisition::{
    AcquisitionHandle, FrameHandoff, Handoff, SharedAcquisition, SharedState, TrackingMode,
};
use contracts::{
    CameraBackend, CameraId, CameraInformation, DepthCamera, FrameSlot, Measure, Pose,
    PositionalTrackingState, SessionConfig, VideoSetting, View,
};
use perception::{
    BodyTracking, DetectionBroker, DetectionFrame, ModelOptimizer, ObjectDetection,
    PerceptionError, Pipeline, PipelineStarter, PlaybackGate,
};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::{Result, SessionError};
use crate::events::{Disconnected, Event, SessionEvents, SessionReady, StateChange};
use crate::sequencer::{InitHandle, InitializationProgress, InitializationSequencer, OpenedSession};

/// EMA weight of the previous consumer-rate estimate
const CONSUMER_FPS_SMOOTHING: f32 = 0.9;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    /// Initialization running in the background
    Opening,
    Ready,
    /// Device lost; recovery in progress
    Disconnected,
    Closed,
}

/// Rates and counters for dashboards and the CLI summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionTelemetry {
    pub grab_fps: f32,
    pub consumer_fps: f32,
    /// `None` while the pipeline is not running
    pub object_detection_fps: Option<f32>,
    pub body_tracking_fps: Option<f32>,
    /// Grabs since the current connection opened
    pub frames_grabbed: u64,
    /// Frames handed to the caller over the session lifetime
    pub frames_consumed: u64,
    pub disconnects: u64,
    pub reconnects: u64,
    pub loop_wraps: u64,
    pub tracking_resets: u64,
}

struct ActiveDevice {
    camera: Arc<dyn DepthCamera>,
    information: CameraInformation,
    acquisition: AcquisitionHandle,
    handoff: FrameHandoff,
}

#[derive(Default)]
struct Starters {
    objects: PipelineStarter<ObjectDetection>,
    bodies: PipelineStarter<BodyTracking>,
}

/// Per-pipeline plumbing the session needs beyond `Pipeline`.
trait SessionPipeline: Pipeline + Sized {
    fn broker(state: &mut SharedState) -> &mut DetectionBroker<Self>;
    fn starter(starters: &mut Starters) -> &mut PipelineStarter<Self>;
    fn configured(config: &SessionConfig) -> (Self::Params, Self::Runtime);
    fn event(frame: DetectionFrame<Self::Batch>) -> Event;
}

impl SessionPipeline for ObjectDetection {
    fn broker(state: &mut SharedState) -> &mut DetectionBroker<Self> {
        &mut state.objects
    }

    fn starter(starters: &mut Starters) -> &mut PipelineStarter<Self> {
        &mut starters.objects
    }

    fn configured(config: &SessionConfig) -> (Self::Params, Self::Runtime) {
        (
            config.to_object_detection_parameters(),
            config.to_object_detection_runtime(),
        )
    }

    fn event(frame: DetectionFrame<Self::Batch>) -> Event {
        Event::Objects(frame)
    }
}

impl SessionPipeline for BodyTracking {
    fn broker(state: &mut SharedState) -> &mut DetectionBroker<Self> {
        &mut state.bodies
    }

    fn starter(starters: &mut Starters) -> &mut PipelineStarter<Self> {
        &mut starters.bodies
    }

    fn configured(config: &SessionConfig) -> (Self::Params, Self::Runtime) {
        (
            config.to_body_tracking_parameters(),
            config.to_body_tracking_runtime(),
        )
    }

    fn event(frame: DetectionFrame<Self::Batch>) -> Event {
        Event::Bodies(frame)
    }
}

/// What one handoff hands over, all from the same grab.
struct Consumed {
    frame: Option<FrameSlot>,
    objects: Option<DetectionFrame<contracts::ObjectsBatch>>,
    bodies: Option<DetectionFrame<contracts::BodiesBatch>>,
}

/// 单个相机会话
pub struct CameraSession {
    config: SessionConfig,
    backend: Arc<dyn CameraBackend>,
    shared: Arc<SharedAcquisition>,
    state: SessionState,
    init: Option<InitHandle>,
    active: Option<ActiveDevice>,
    starters: Starters,
    events: SessionEvents,
    pending: Vec<Event>,

    /// Carried into the next `begin` as the tracking origin
    origin_override: Option<Pose>,
    /// Kept after close so `reboot` knows the serial
    information: Option<CameraInformation>,
    last_error: Option<SessionError>,
    last_progress: InitializationProgress,
    latest_frame: Option<FrameSlot>,

    consumer_fps: f32,
    last_consumed_ns: Option<u64>,
    frames_consumed: u64,
    disconnects: u64,
    reconnects: u64,
}

impl CameraSession {
    pub fn new(config: SessionConfig, backend: Arc<dyn CameraBackend>) -> Self {
        let shared = Arc::new(SharedAcquisition::new(
            config.camera_id.clone(),
            &config.input,
        ));
        Self {
            config,
            backend,
            shared,
            state: SessionState::Uninitialized,
            init: None,
            active: None,
            starters: Starters::default(),
            events: SessionEvents::default(),
            pending: Vec::new(),
            origin_override: None,
            information: None,
            last_error: None,
            last_progress: InitializationProgress::NotStarted,
            latest_frame: None,
            consumer_fps: 0.0,
            last_consumed_ns: None,
            frames_consumed: 0,
            disconnects: 0,
            reconnects: 0,
        }
    }

    // ===== Lifecycle =====

    /// Start initializing. Returns immediately; follow along with
    /// `progress()` and `update()`. No-op while opening or ready.
    #[instrument(name = "camera_session_begin", skip(self), fields(camera_id = %self.config.camera_id))]
    pub fn begin(&mut self) -> Result<()> {
        if matches!(self.state, SessionState::Opening | SessionState::Ready) {
            debug!(state = ?self.state, "begin ignored, session already started");
            return Ok(());
        }

        let shared = Arc::new(SharedAcquisition::new(
            self.config.camera_id.clone(),
            &self.config.input,
        ));
        {
            let mut state = shared.lock();
            state
                .objects
                .set_runtime(self.config.to_object_detection_runtime());
            state
                .bodies
                .set_runtime(self.config.to_body_tracking_runtime());
        }
        self.shared = shared;

        let handle = InitializationSequencer::begin(
            self.config.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.shared),
            self.origin_override,
        )?;
        self.init = Some(handle);
        self.last_error = None;
        self.last_progress = InitializationProgress::NotStarted;
        self.last_consumed_ns = None;
        self.transition(SessionState::Opening);
        Ok(())
    }

    /// Per-tick work. Never blocks on the device; events produced during the
    /// tick are dispatched at the end, after the shared lock is released.
    pub fn update(&mut self) {
        match self.state {
            SessionState::Opening => self.poll_init(),
            SessionState::Ready => self.tick(),
            _ => {}
        }
        self.dispatch_pending();
    }

    /// Stop threads, disable pipelines and tracking, release the device.
    #[instrument(name = "camera_session_close", skip(self), fields(camera_id = %self.config.camera_id))]
    pub fn close(&mut self) {
        if self.init.is_none() && self.active.is_none() {
            return;
        }
        self.shutdown_device();
        self.transition(SessionState::Closed);
        info!("session closed");
        self.dispatch_pending();
    }

    /// Power-cycle the camera and start over.
    ///
    /// Blocks while polling discovery; not finding the device again within
    /// the configured window is fatal and leaves the session closed.
    #[instrument(name = "camera_session_reboot", skip(self), fields(camera_id = %self.config.camera_id))]
    pub fn reboot(&mut self) -> Result<()> {
        let serial = self
            .information
            .as_ref()
            .map(|info| info.serial_number)
            .ok_or(SessionError::RebootUnavailable)?;

        self.close();
        self.backend
            .reboot(serial)
            .map_err(|source| SessionError::RebootFailed { source })?;
        info!(serial, "reboot issued, waiting for device");

        let window = Duration::from_secs(self.config.recovery.reboot_discovery_timeout_sec);
        let poll = Duration::from_millis(self.config.recovery.reboot_poll_interval_ms);
        let started = Instant::now();
        while !self
            .backend
            .device_list()
            .iter()
            .any(|device| device.serial_number == serial)
        {
            if started.elapsed() >= window {
                error!(serial, waited_secs = window.as_secs(), "device did not come back after reboot");
                return Err(SessionError::RebootTimeout {
                    serial,
                    waited_secs: window.as_secs(),
                });
            }
            thread::sleep(poll);
        }

        info!(serial, elapsed_ms = started.elapsed().as_millis() as u64, "device rediscovered");
        self.begin()
    }

    // ===== Tracking =====

    #[instrument(name = "camera_session_start_tracking", skip(self), fields(camera_id = %self.config.camera_id))]
    pub fn start_tracking(&mut self) -> Result<()> {
        let camera = self.ready_camera()?;
        self.shared.lock().tracking.begin_enable()?;

        let params = self.config.to_tracking_parameters(None);
        let result = camera.enable_tracking(&params);

        self.shared
            .lock()
            .tracking
            .complete_enable(result, self.config.tracking.set_as_static)?;
        Ok(())
    }

    #[instrument(name = "camera_session_stop_tracking", skip(self), fields(camera_id = %self.config.camera_id))]
    pub fn stop_tracking(&mut self) -> Result<()> {
        let camera = self.ready_camera()?;
        {
            let mut state = self.shared.lock();
            state.tracking.disable();
            state.tracking_state = PositionalTrackingState::Off;
            state.playback.wrap_origin = None;
        }
        camera.disable_tracking(self.area_file().as_deref());
        Ok(())
    }

    /// Re-seed tracking to the configured initial pose.
    pub fn reset(&mut self) -> Result<()> {
        self.reset_tracking_to(self.config.tracking.initial_pose())
    }

    pub fn reset_tracking_to(&mut self, pose: Pose) -> Result<()> {
        let camera = self.ready_camera()?;
        self.shared.reset_tracking(camera.as_ref(), &pose)?;
        info!(camera_id = %self.config.camera_id, "tracking origin reset");
        Ok(())
    }

    // ===== Detection pipelines =====

    /// Start object detection; completes on a later `update()`.
    pub fn start_object_detection(&mut self) -> Result<()> {
        self.start_pipeline::<ObjectDetection>()
    }

    pub fn stop_object_detection(&mut self) {
        self.stop_pipeline::<ObjectDetection>();
    }

    /// Start body tracking; completes on a later `update()`.
    pub fn start_body_tracking(&mut self) -> Result<()> {
        self.start_pipeline::<BodyTracking>()
    }

    pub fn stop_body_tracking(&mut self) {
        self.stop_pipeline::<BodyTracking>();
    }

    pub fn is_object_detection_running(&self) -> bool {
        self.shared.lock().objects.is_running()
    }

    pub fn is_body_tracking_running(&self) -> bool {
        self.shared.lock().bodies.is_running()
    }

    // ===== Playback =====

    pub fn set_svo_position(&self, frame: i32) -> Result<()> {
        let camera = self.ready_camera()?;
        self.shared.set_position(camera.as_ref(), frame);
        Ok(())
    }

    pub fn pause(&self) {
        self.shared.pause();
    }

    pub fn resume(&self) {
        self.shared.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }

    pub fn svo_position(&self) -> i32 {
        self.shared.lock().playback.current
    }

    pub fn svo_number_of_frames(&self) -> i32 {
        self.shared.lock().playback.total
    }

    // ===== Camera settings (driver-serialized, no lock) =====

    pub fn camera_setting(&self, setting: VideoSetting) -> Result<i32> {
        self.ready_camera()?
            .camera_setting(setting)
            .map_err(|source| SessionError::Setting { source })
    }

    pub fn set_camera_setting(&self, setting: VideoSetting, value: i32) -> Result<()> {
        self.ready_camera()?
            .set_camera_setting(setting, value)
            .map_err(|source| SessionError::Setting { source })
    }

    // ===== Accessors =====

    pub fn camera_id(&self) -> &CameraId {
        &self.config.camera_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn progress(&self) -> InitializationProgress {
        self.init
            .as_ref()
            .map_or(self.last_progress, InitHandle::progress)
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    pub fn latest_frame(&self) -> Option<&FrameSlot> {
        self.latest_frame.as_ref()
    }

    pub fn pose(&self) -> Pose {
        self.shared.lock().pose
    }

    pub fn tracking_state(&self) -> PositionalTrackingState {
        self.shared.lock().tracking_state
    }

    pub fn tracking_mode(&self) -> TrackingMode {
        self.shared.lock().tracking.mode()
    }

    pub fn camera_information(&self) -> Option<&CameraInformation> {
        self.information.as_ref()
    }

    pub fn telemetry(&self) -> SessionTelemetry {
        let snapshot = self.shared.metrics().snapshot();
        let state = self.shared.lock();
        SessionTelemetry {
            grab_fps: state.grab_fps,
            consumer_fps: self.consumer_fps,
            object_detection_fps: state.objects.is_running().then(|| state.objects.fps()),
            body_tracking_fps: state.bodies.is_running().then(|| state.bodies.fps()),
            frames_grabbed: state.frames_grabbed,
            frames_consumed: self.frames_consumed,
            disconnects: self.disconnects,
            reconnects: self.reconnects,
            loop_wraps: snapshot.loop_wraps,
            tracking_resets: state.tracking.resets(),
        }
    }

    /// Subscribe to session events.
    pub fn events(&mut self) -> &mut SessionEvents {
        &mut self.events
    }

    // ===== Internals =====

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        info!(camera_id = %self.config.camera_id, ?from, ?to, "session state changed");
        self.pending.push(Event::StateChanged(StateChange { from, to }));
    }

    fn dispatch_pending(&mut self) {
        for event in std::mem::take(&mut self.pending) {
            self.events.dispatch(&event);
        }
    }

    fn ready_camera(&self) -> Result<Arc<dyn DepthCamera>> {
        match (&self.active, self.state) {
            (Some(active), SessionState::Ready) => Ok(Arc::clone(&active.camera)),
            _ => Err(SessionError::NotReady { state: self.state }),
        }
    }

    fn area_file(&self) -> Option<std::path::PathBuf> {
        let tracking = &self.config.tracking;
        tracking
            .enable_area_memory
            .then(|| tracking.area_memory_path.clone())
            .flatten()
    }

    fn poll_init(&mut self) {
        let Some(handle) = self.init.as_mut() else {
            return;
        };
        self.last_progress = handle.progress();
        let Some(outcome) = handle.try_finish() else {
            return;
        };
        let init_duration = handle.elapsed();
        self.init = None;

        match outcome {
            Ok(opened) => self.on_opened(opened, init_duration),
            Err(e) => {
                error!(
                    camera_id = %self.config.camera_id,
                    error = %e,
                    kind = ?e.kind(),
                    device_code = ?e.device_code(),
                    "session failed to initialize"
                );
                self.last_progress = InitializationProgress::Failed(e.code());
                self.last_error = Some(e);
                self.transition(SessionState::Closed);
            }
        }
    }

    fn on_opened(&mut self, opened: OpenedSession, init_duration: Duration) {
        let OpenedSession {
            camera,
            information,
            acquisition,
        } = opened;
        let handoff = FrameHandoff::new(Arc::clone(&self.shared), Arc::clone(&camera));
        self.active = Some(ActiveDevice {
            camera,
            information: information.clone(),
            acquisition,
            handoff,
        });
        self.information = Some(information.clone());
        self.origin_override = None;
        self.last_progress = InitializationProgress::Ready;

        observability::record_init_duration(&self.config.camera_id, init_duration.as_secs_f64());
        self.transition(SessionState::Ready);
        self.pending.push(Event::Ready(SessionReady {
            camera_id: self.config.camera_id.clone(),
            information,
            init_duration,
        }));

        if self.config.object_detection.start_on_ready {
            if let Err(e) = self.start_object_detection() {
                warn!(camera_id = %self.config.camera_id, error = %e, "object detection did not start");
                self.last_error = Some(e);
            }
        }
        if self.config.body_tracking.start_on_ready {
            if let Err(e) = self.start_body_tracking() {
                warn!(camera_id = %self.config.camera_id, error = %e, "body tracking did not start");
                self.last_error = Some(e);
            }
        }
    }

    fn tick(&mut self) {
        if self.shared.take_disconnected() {
            self.recover();
            return;
        }

        self.poll_start::<ObjectDetection>();
        self.poll_start::<BodyTracking>();

        let Some(active) = self.active.as_ref() else {
            return;
        };
        self.shared.wrap_if_ended(active.camera.as_ref());

        let handoff = active.handoff.take(|state, camera| Consumed {
            objects: consume_synced::<ObjectDetection>(state),
            bodies: consume_synced::<BodyTracking>(state),
            frame: capture_frame(state, camera),
        });

        let (objects, bodies) = {
            let camera = active.camera.as_ref();
            let mut state = self.shared.lock();
            (
                consume_unsynced::<ObjectDetection>(&mut state, camera),
                consume_unsynced::<BodyTracking>(&mut state, camera),
            )
        };

        if let Some(Handoff { value, wrapped }) = handoff {
            if wrapped {
                debug!(camera_id = %self.config.camera_id, "playback wrapped during handoff");
            }
            if let Some(frame) = value.frame {
                self.record_consumed(frame.timestamp_ns);
                self.latest_frame = Some(frame.clone());
                self.pending.push(Event::FrameGrabbed(frame));
            }
            self.publish::<ObjectDetection>(value.objects);
            self.publish::<BodyTracking>(value.bodies);
        }
        self.publish::<ObjectDetection>(objects);
        self.publish::<BodyTracking>(bodies);
    }

    fn record_consumed(&mut self, timestamp_ns: u64) {
        if let Some(prev) = self.last_consumed_ns {
            if timestamp_ns > prev {
                let instant = 1e9 / (timestamp_ns - prev) as f32;
                self.consumer_fps = if self.consumer_fps > 0.0 {
                    CONSUMER_FPS_SMOOTHING * self.consumer_fps
                        + (1.0 - CONSUMER_FPS_SMOOTHING) * instant
                } else {
                    instant
                };
            }
        }
        self.last_consumed_ns = Some(timestamp_ns);
        self.frames_consumed += 1;

        let grab_fps = self.shared.lock().grab_fps;
        observability::record_frame_consumed(&self.config.camera_id);
        observability::record_grab_fps(&self.config.camera_id, grab_fps as f64);
    }

    fn publish<P: SessionPipeline>(&mut self, frame: Option<DetectionFrame<P::Batch>>) {
        if let Some(frame) = frame {
            trace!(
                camera_id = %self.config.camera_id,
                pipeline = P::NAME,
                sequence = frame.sequence,
                "detection frame published"
            );
            observability::record_detection_frame(&self.config.camera_id, P::NAME);
            self.pending.push(P::event(frame));
        }
    }

    fn start_pipeline<P: SessionPipeline>(&mut self) -> Result<()> {
        let camera = self.ready_camera()?;
        let (params, runtime) = P::configured(&self.config);
        {
            let mut state = self.shared.lock();
            let broker = P::broker(&mut state);
            if broker.is_running() {
                debug!(pipeline = P::NAME, "pipeline already running");
                return Ok(());
            }
            broker.set_runtime(runtime);
        }

        let optimizer = ModelOptimizer::new(Arc::clone(&self.backend), &self.config.optimization);
        let gate: Arc<dyn PlaybackGate> = self.shared.clone();
        P::starter(&mut self.starters)
            .start(camera, optimizer, gate, params)
            .map_err(|e| match e {
                PerceptionError::AlreadyStarting { pipeline } => {
                    SessionError::AlreadyStarting { pipeline }
                }
                source => SessionError::PipelineStart {
                    pipeline: P::NAME,
                    source,
                },
            })?;
        info!(camera_id = %self.config.camera_id, pipeline = P::NAME, "pipeline starting");
        Ok(())
    }

    fn poll_start<P: SessionPipeline>(&mut self) {
        let Some(result) = P::starter(&mut self.starters).poll() else {
            return;
        };
        match result {
            Ok(params) => {
                let mut state = self.shared.lock();
                P::broker(&mut state).activate(params);
                info!(camera_id = %self.config.camera_id, pipeline = P::NAME, "pipeline running");
            }
            Err(source) => {
                warn!(camera_id = %self.config.camera_id, pipeline = P::NAME, error = %source, "pipeline failed to start");
                self.last_error = Some(SessionError::PipelineStart {
                    pipeline: P::NAME,
                    source,
                });
            }
        }
    }

    /// Waits for an in-flight start before disabling.
    fn stop_pipeline<P: SessionPipeline>(&mut self) {
        let enabled_late = matches!(P::starter(&mut self.starters).wait(), Some(Ok(_)));
        let was_running = {
            let mut state = self.shared.lock();
            let broker = P::broker(&mut state);
            let running = broker.is_running();
            broker.deactivate();
            running
        };
        if let Some(active) = &self.active {
            if was_running || enabled_late {
                P::disable(active.camera.as_ref());
                info!(camera_id = %self.config.camera_id, pipeline = P::NAME, "pipeline stopped");
            }
        }
    }

    /// Disconnect recovery: notify, keep the last pose, close, reopen.
    fn recover(&mut self) {
        let will_reconnect = self.config.recovery.auto_reconnect;
        let last_pose = {
            let mut state = self.shared.lock();
            let pose = state.tracking.is_active().then_some(state.pose);
            state.tracking.on_disconnect();
            pose
        };
        warn!(
            camera_id = %self.config.camera_id,
            will_reconnect,
            has_pose = last_pose.is_some(),
            "camera disconnected"
        );
        observability::record_disconnect(&self.config.camera_id);
        self.disconnects += 1;
        self.pending.push(Event::Disconnected(Disconnected {
            camera_id: self.config.camera_id.clone(),
            last_pose,
            will_reconnect,
        }));
        self.last_error = Some(SessionError::Disconnected);

        self.transition(SessionState::Disconnected);
        self.shutdown_device();
        self.transition(SessionState::Closed);

        if will_reconnect {
            self.origin_override = last_pose.or(self.origin_override);
            self.reconnects += 1;
            if let Err(e) = self.begin() {
                error!(camera_id = %self.config.camera_id, error = %e, "reconnect could not start");
                self.last_error = Some(e);
            }
        }
    }

    fn shutdown_device(&mut self) {
        if let Some(mut init) = self.init.take() {
            init.cancel();
        }
        self.stop_pipeline::<ObjectDetection>();
        self.stop_pipeline::<BodyTracking>();
        self.shared.set_ready(false);

        if let Some(mut active) = self.active.take() {
            active.acquisition.stop();
            let tracking = {
                let mut state = self.shared.lock();
                let active_tracking = state.tracking.is_active();
                state.tracking.disable();
                active_tracking
            };
            if tracking {
                active.camera.disable_tracking(self.area_file().as_deref());
            }
            active.camera.close();
            debug!(camera_id = %self.config.camera_id, "device released");
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Copy the grabbed image and depth out of the driver.
fn capture_frame(state: &mut SharedState, camera: &dyn DepthCamera) -> Option<FrameSlot> {
    let image = match camera.retrieve_image(View::Left) {
        Ok(image) => image,
        Err(e) => {
            trace!(error = %e, "image retrieve failed");
            return None;
        }
    };
    Some(FrameSlot {
        timestamp_ns: state.grab_timestamp_ns,
        frame_index: state.frames_grabbed,
        image,
        depth: camera.retrieve_measure(Measure::Depth).ok(),
        grab_error: state.last_grab_error.take(),
    })
}

/// Image-synced results were retrieved by the grab thread for this frame.
fn consume_synced<P: SessionPipeline>(
    state: &mut SharedState,
) -> Option<DetectionFrame<P::Batch>> {
    let broker = P::broker(state);
    if broker.image_sync() {
        broker.consume()
    } else {
        None
    }
}

/// Unsynced results are pulled on the consumer thread right before consume.
fn consume_unsynced<P: SessionPipeline>(
    state: &mut SharedState,
    camera: &dyn DepthCamera,
) -> Option<DetectionFrame<P::Batch>> {
    let broker = P::broker(state);
    if !broker.is_running() || broker.image_sync() {
        return None;
    }
    broker.retrieve(camera);
    broker.consume()
}
