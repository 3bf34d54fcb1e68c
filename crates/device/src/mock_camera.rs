//! Mock depth camera
//!
//! Implements `DepthCamera` without hardware. Frames, poses and perception
//! results are synthesized deterministically so session logic can be tested
//! against exact expectations. Faults are injected through `MockControl`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use contracts::{
    BodiesBatch, BodyData, BodyTrackingParameters, BodyTrackingRuntime, CalibrationParameters,
    CameraInformation, CameraIntrinsics, CameraModel, DepthCamera, DeviceError, DeviceResult,
    EntityTrackingState, ImageBuffer, ImageFormat, InitParameters, InputSource, Measure,
    ObjectClass, ObjectData, ObjectDetectionParameters, ObjectDetectionRuntime, ObjectsBatch,
    Pose, PositionalTrackingState, ReferenceFrame, RuntimeParameters, TrackingParameters,
    VideoSetting, View,
};
use parking_lot::Mutex;
use tracing::{debug, instrument, trace};

use crate::trajectory::{synthetic_pose, TrackingOrigin};

/// Serial number reported by mock devices unless overridden.
pub const MOCK_SERIAL: u32 = 30_000_001;

/// `MockControl::fail_next_opens` value meaning "never open".
pub const FAIL_FOREVER: u32 = u32::MAX;

const TIMESTAMP_BASE_NS: u64 = 1_000_000_000;

const OBJECT_CLASSES: [ObjectClass; 3] =
    [ObjectClass::Person, ObjectClass::Vehicle, ObjectClass::Bag];

/// Mock camera configuration
#[derive(Debug, Clone)]
pub struct MockCameraConfig {
    pub serial_number: u32,
    pub camera_model: CameraModel,
    /// Overrides the resolution-derived frame size (keeps test buffers small).
    pub image_size: Option<(u32, u32)>,
    /// Time `grab()` blocks, standing in for the sensor exposure.
    pub grab_interval: Duration,
    /// Length of a simulated recording.
    pub recording_frames: i32,
    pub objects_per_frame: usize,
    pub bodies_per_frame: usize,
    /// Report 0×0 frames from `camera_information`.
    pub report_invalid_dimensions: bool,
    /// Tracking status reported while tracking is enabled.
    pub tracking_state: PositionalTrackingState,
}

impl Default for MockCameraConfig {
    fn default() -> Self {
        Self {
            serial_number: MOCK_SERIAL,
            camera_model: CameraModel::Zed2i,
            image_size: None,
            grab_interval: Duration::from_millis(1),
            recording_frames: 120,
            objects_per_frame: 2,
            bodies_per_frame: 1,
            report_invalid_dimensions: false,
            tracking_state: PositionalTrackingState::Ok,
        }
    }
}

/// Fault injection and call journal shared by every camera one backend
/// creates, so a test keeps control across close/reopen cycles.
#[derive(Debug, Default)]
pub struct MockControl {
    failing_opens: AtomicU32,
    disconnected: AtomicBool,
    fail_tracking_enable: AtomicBool,
    fail_tracking_reset: AtomicBool,
    open_attempts: AtomicU32,
    successful_opens: AtomicU32,
    closes: AtomicU32,
    grabs: AtomicU64,
    tracking_enables: Mutex<Vec<Pose>>,
    tracking_resets: Mutex<Vec<Pose>>,
    settings: Mutex<HashMap<VideoSetting, i32>>,
}

impl MockControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `count` opens fail with `CameraNotDetected`; `FAIL_FOREVER` never recovers.
    pub fn fail_next_opens(&self, count: u32) {
        self.failing_opens.store(count, Ordering::SeqCst);
    }

    /// Unplug: grabs and opens fail with `CameraNotDetected` until `reconnect`.
    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    pub fn reconnect(&self) {
        self.disconnected.store(false, Ordering::SeqCst);
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub fn set_fail_tracking_enable(&self, fail: bool) {
        self.fail_tracking_enable.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_tracking_reset(&self, fail: bool) {
        self.fail_tracking_reset.store(fail, Ordering::SeqCst);
    }

    pub fn open_attempts(&self) -> u32 {
        self.open_attempts.load(Ordering::SeqCst)
    }

    pub fn successful_opens(&self) -> u32 {
        self.successful_opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn grabs(&self) -> u64 {
        self.grabs.load(Ordering::SeqCst)
    }

    /// Initial poses passed to every successful `enable_tracking`.
    pub fn tracking_enable_poses(&self) -> Vec<Pose> {
        self.tracking_enables.lock().clone()
    }

    /// Poses passed to every successful `reset_tracking`.
    pub fn tracking_reset_poses(&self) -> Vec<Pose> {
        self.tracking_resets.lock().clone()
    }

    fn take_open_failure(&self) -> bool {
        self.failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                FAIL_FOREVER => Some(n),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

#[derive(Default)]
struct CameraState {
    opened: bool,
    recorded: bool,
    width: u32,
    height: u32,
    fps: f32,
    total_frames: i32,
    current: i32,
    next: i32,
    grab_count: u64,
    timestamp_ns: u64,
    tracking: Option<TrackingOrigin>,
    objects: Option<ObjectDetectionParameters>,
    bodies: Option<BodyTrackingParameters>,
    objects_fresh: bool,
    bodies_fresh: bool,
}

impl CameraState {
    fn trajectory_index(&self) -> u64 {
        if self.recorded {
            self.current.max(0) as u64
        } else {
            self.grab_count
        }
    }

    fn frame_period_ns(&self) -> u64 {
        (1e9 / self.fps.max(1.0)) as u64
    }
}

/// Mock camera
pub struct MockCamera {
    config: MockCameraConfig,
    control: Arc<MockControl>,
    state: Mutex<CameraState>,
}

impl MockCamera {
    pub fn new(config: MockCameraConfig, control: Arc<MockControl>) -> Self {
        Self {
            config,
            control,
            state: Mutex::new(CameraState::default()),
        }
    }

    pub fn control(&self) -> &Arc<MockControl> {
        &self.control
    }

    fn ensure_open(state: &CameraState) -> DeviceResult<()> {
        if state.opened {
            Ok(())
        } else {
            Err(DeviceError::CameraNotInitialized)
        }
    }

    /// Frame pixels carry the capture timestamp in their first bytes so
    /// consumers can tell frames apart.
    fn stamped_buffer(state: &CameraState, format: ImageFormat) -> ImageBuffer {
        let len = state.width as usize * state.height as usize * format.bytes_per_pixel();
        let mut data = vec![0u8; len];
        let stamp = state.timestamp_ns.to_le_bytes();
        let n = stamp.len().min(len);
        data[..n].copy_from_slice(&stamp[..n]);
        ImageBuffer {
            width: state.width,
            height: state.height,
            format,
            data: Bytes::from(data),
        }
    }

    fn default_setting(setting: VideoSetting) -> i32 {
        match setting {
            VideoSetting::Hue => 0,
            VideoSetting::Gamma => 5,
            VideoSetting::Gain | VideoSetting::Exposure => 50,
            VideoSetting::AecAgc | VideoSetting::WhiteBalanceAuto | VideoSetting::LedStatus => 1,
            VideoSetting::WhiteBalanceTemperature => 4600,
            _ => 4,
        }
    }
}

fn is_recording_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("svo") || e.eq_ignore_ascii_case("svo2"))
}

fn synthetic_calibration(width: u32, height: u32) -> CalibrationParameters {
    let intrinsics = CameraIntrinsics {
        fx: width as f32 * 0.55,
        fy: width as f32 * 0.55,
        cx: width as f32 / 2.0,
        cy: height as f32 / 2.0,
        distortion: [0.0; 5],
        vertical_fov_deg: 70.0,
    };
    CalibrationParameters {
        left: intrinsics,
        right: intrinsics,
        baseline_m: 0.12,
    }
}

impl DepthCamera for MockCamera {
    #[instrument(name = "mock_camera_open", skip(self, params), fields(input = ?params.input.kind()))]
    fn open(&self, params: &InitParameters) -> DeviceResult<()> {
        self.control.open_attempts.fetch_add(1, Ordering::SeqCst);

        if self.control.is_disconnected() || self.control.take_open_failure() {
            return Err(DeviceError::CameraNotDetected);
        }

        let (recorded, total_frames) = match &params.input {
            InputSource::RecordedFile { path, .. } => {
                if !is_recording_path(path) {
                    return Err(DeviceError::InvalidSvoFile);
                }
                (true, self.config.recording_frames)
            }
            _ => (false, 0),
        };

        let (width, height) = self
            .config
            .image_size
            .or_else(|| params.resolution.dimensions())
            .unwrap_or((1280, 720));

        *self.state.lock() = CameraState {
            opened: true,
            recorded,
            width,
            height,
            fps: params.fps as f32,
            total_frames,
            ..CameraState::default()
        };
        self.control.successful_opens.fetch_add(1, Ordering::SeqCst);
        debug!(width, height, recorded, "mock camera opened");
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        if state.opened {
            self.control.closes.fetch_add(1, Ordering::SeqCst);
        }
        *state = CameraState::default();
    }

    fn grab(&self, _params: &RuntimeParameters) -> DeviceResult<()> {
        Self::ensure_open(&self.state.lock())?;

        // Simulated exposure; the state lock is not held while blocking.
        thread::sleep(self.config.grab_interval);

        if self.control.is_disconnected() {
            return Err(DeviceError::CameraNotDetected);
        }

        let mut state = self.state.lock();
        Self::ensure_open(&state)?;

        let period = state.frame_period_ns();
        if state.recorded {
            if state.next >= state.total_frames {
                return Err(DeviceError::EndOfSvoFile);
            }
            state.current = state.next;
            state.next += 1;
            state.timestamp_ns = TIMESTAMP_BASE_NS + state.current as u64 * period;
        } else {
            state.timestamp_ns = TIMESTAMP_BASE_NS + (state.grab_count + 1) * period;
        }
        state.grab_count += 1;
        state.objects_fresh = state.objects.is_some();
        state.bodies_fresh = state.bodies.is_some();
        self.control.grabs.fetch_add(1, Ordering::SeqCst);

        trace!(
            grab = state.grab_count,
            timestamp_ns = state.timestamp_ns,
            "mock grab"
        );
        Ok(())
    }

    fn camera_information(&self) -> DeviceResult<CameraInformation> {
        let state = self.state.lock();
        Self::ensure_open(&state)?;

        let (width, height) = if self.config.report_invalid_dimensions {
            (0, 0)
        } else {
            (state.width, state.height)
        };
        Ok(CameraInformation {
            serial_number: self.config.serial_number,
            camera_model: self.config.camera_model,
            firmware_version: 1523,
            width,
            height,
            fps: state.fps,
            calibration: synthetic_calibration(width, height),
        })
    }

    fn image_timestamp_ns(&self) -> u64 {
        self.state.lock().timestamp_ns
    }

    fn retrieve_image(&self, _view: View) -> DeviceResult<ImageBuffer> {
        let state = self.state.lock();
        Self::ensure_open(&state)?;
        Ok(Self::stamped_buffer(&state, ImageFormat::Bgra8))
    }

    fn retrieve_measure(&self, measure: Measure) -> DeviceResult<ImageBuffer> {
        let state = self.state.lock();
        Self::ensure_open(&state)?;
        Ok(Self::stamped_buffer(&state, measure.format()))
    }

    fn enable_tracking(&self, params: &TrackingParameters) -> DeviceResult<()> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;

        if self.control.fail_tracking_enable.load(Ordering::SeqCst) {
            return Err(DeviceError::Failure);
        }
        if params.enable_area_memory {
            if let Some(path) = &params.area_file_path {
                if path.extension().and_then(|e| e.to_str()) != Some("area") {
                    return Err(DeviceError::InvalidAreaFile);
                }
            }
        }

        let anchor = synthetic_pose(state.trajectory_index());
        state.tracking = Some(TrackingOrigin::new(params.initial_pose, &anchor));
        self.control.tracking_enables.lock().push(params.initial_pose);
        Ok(())
    }

    fn disable_tracking(&self, area_file: Option<&Path>) {
        let mut state = self.state.lock();
        if let Some(path) = area_file {
            trace!(path = %path.display(), "mock spatial memory export skipped");
        }
        state.tracking = None;
    }

    fn reset_tracking(&self, pose: &Pose) -> DeviceResult<()> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;

        if self.control.fail_tracking_reset.load(Ordering::SeqCst) {
            return Err(DeviceError::Failure);
        }
        if state.tracking.is_none() {
            return Err(DeviceError::InvalidFunctionCall);
        }

        let anchor = synthetic_pose(state.trajectory_index());
        state.tracking = Some(TrackingOrigin::new(*pose, &anchor));
        self.control.tracking_resets.lock().push(*pose);
        Ok(())
    }

    fn get_position(&self, _reference: ReferenceFrame) -> (PositionalTrackingState, Pose) {
        let state = self.state.lock();
        match &state.tracking {
            Some(origin) => (
                self.config.tracking_state,
                origin.rebase(&synthetic_pose(state.trajectory_index())),
            ),
            None => (PositionalTrackingState::Off, Pose::identity()),
        }
    }

    fn enable_object_detection(&self, params: &ObjectDetectionParameters) -> DeviceResult<()> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.objects = Some(params.clone());
        state.objects_fresh = false;
        Ok(())
    }

    fn disable_object_detection(&self) {
        let mut state = self.state.lock();
        state.objects = None;
        state.objects_fresh = false;
    }

    fn retrieve_objects(&self, runtime: &ObjectDetectionRuntime) -> DeviceResult<ObjectsBatch> {
        let mut state = self.state.lock();
        let (tracked, segmentation) = match &state.objects {
            Some(params) => (params.enable_tracking, params.enable_segmentation),
            None => return Err(DeviceError::InvalidFunctionCall),
        };
        let is_new = std::mem::replace(&mut state.objects_fresh, false);
        let depth = 2.0 + 0.01 * state.trajectory_index() as f32;

        let objects = (0..self.config.objects_per_frame)
            .map(|i| ObjectData {
                id: i as i32,
                label: OBJECT_CLASSES[i % OBJECT_CLASSES.len()],
                confidence: 80.0,
                position: [i as f32 * 0.5, 0.0, depth],
                velocity: [0.0; 3],
                dimensions: [0.5, 1.7, 0.4],
                bounding_box_2d: [[10, 10], [50, 10], [50, 90], [10, 90]],
                tracking_state: if tracked {
                    EntityTrackingState::Ok
                } else {
                    EntityTrackingState::Off
                },
                mask: segmentation.then(|| Bytes::from(vec![255u8; 40 * 80])),
            })
            .filter(|o| o.confidence >= f32::from(runtime.confidence.threshold(o.label)))
            .collect();

        Ok(ObjectsBatch {
            timestamp_ns: state.timestamp_ns,
            is_new,
            is_tracked: tracked,
            objects,
        })
    }

    fn enable_body_tracking(&self, params: &BodyTrackingParameters) -> DeviceResult<()> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;
        state.bodies = Some(params.clone());
        state.bodies_fresh = false;
        Ok(())
    }

    fn disable_body_tracking(&self) {
        let mut state = self.state.lock();
        state.bodies = None;
        state.bodies_fresh = false;
    }

    fn retrieve_bodies(&self, runtime: &BodyTrackingRuntime) -> DeviceResult<BodiesBatch> {
        let mut state = self.state.lock();
        let (tracked, keypoints, segmentation) = match &state.bodies {
            Some(params) => (
                params.enable_tracking,
                params.format.keypoint_count(),
                params.enable_segmentation,
            ),
            None => return Err(DeviceError::InvalidFunctionCall),
        };
        let is_new = std::mem::replace(&mut state.bodies_fresh, false);

        let bodies = (0..self.config.bodies_per_frame)
            .map(|i| BodyData {
                id: i as i32,
                confidence: 75.0,
                position: [i as f32, 0.0, 3.0],
                velocity: [0.0; 3],
                keypoints: (0..keypoints).map(|k| [i as f32, k as f32 * 0.05, 3.0]).collect(),
                keypoint_confidence: vec![90.0; keypoints],
                tracking_state: if tracked {
                    EntityTrackingState::Ok
                } else {
                    EntityTrackingState::Off
                },
                mask: segmentation.then(|| Bytes::from(vec![255u8; 40 * 80])),
            })
            .filter(|b| {
                b.confidence >= f32::from(runtime.confidence_threshold)
                    && b.keypoints.len() >= runtime.minimum_keypoints_threshold as usize
            })
            .collect();

        Ok(BodiesBatch {
            timestamp_ns: state.timestamp_ns,
            is_new,
            is_tracked: tracked,
            bodies,
        })
    }

    fn svo_position(&self) -> i32 {
        let state = self.state.lock();
        if state.recorded {
            state.current
        } else {
            0
        }
    }

    fn set_svo_position(&self, frame: i32) {
        let mut state = self.state.lock();
        if state.recorded {
            let frame = frame.clamp(0, (state.total_frames - 1).max(0));
            state.current = frame;
            state.next = frame;
        }
    }

    fn svo_number_of_frames(&self) -> i32 {
        self.state.lock().total_frames
    }

    fn camera_setting(&self, setting: VideoSetting) -> DeviceResult<i32> {
        Self::ensure_open(&self.state.lock())?;
        Ok(self
            .control
            .settings
            .lock()
            .get(&setting)
            .copied()
            .unwrap_or_else(|| Self::default_setting(setting)))
    }

    fn set_camera_setting(&self, setting: VideoSetting, value: i32) -> DeviceResult<()> {
        Self::ensure_open(&self.state.lock())?;
        let (min, max) = setting.range();
        if !(min..=max).contains(&value) {
            return Err(DeviceError::InvalidFunctionParameters);
        }
        self.control.settings.lock().insert(setting, value);
        Ok(())
    }
}
