//! Replay Camera - 从录制目录回放相机会话
//!
//! 录制目录结构：
//! - `manifest.json`: 相机型号、分辨率、帧率
//! - `frames.jsonl`: 每行一帧 (时间戳、位姿、检测结果、图像文件路径)
//! - 可选的二进制图像/深度文件
//!
//! 回放相机实现 `DepthCamera`，行为与录像输入一致：帧游标、跳转、
//! 文件结束、可选的按原始时间戳实时回放。

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use contracts::{
    AiModel, BodiesBatch, BodyData, BodyTrackingParameters, BodyTrackingRuntime,
    CalibrationParameters, CameraBackend, CameraInformation, CameraModel, DepthCamera,
    DeviceError, DeviceProperties, DeviceResult, ImageBuffer, ImageFormat, InitParameters,
    InputSource, Measure, ModelStatus, ObjectData, ObjectDetectionParameters,
    ObjectDetectionRuntime, ObjectsBatch, Pose, PositionalTrackingState, ReferenceFrame,
    RuntimeParameters, TrackingParameters, VideoSetting, View,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{RecordingError, Result};
use crate::trajectory::TrackingOrigin;

const MANIFEST_FILE: &str = "manifest.json";
const FRAMES_FILE: &str = "frames.jsonl";

/// 录制会话 manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingManifest {
    pub version: String,
    pub camera_model: CameraModel,
    pub serial_number: u32,
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    #[serde(default)]
    pub calibration: CalibrationParameters,
    /// Expected frame count, checked on load when present.
    #[serde(default)]
    pub frame_count: Option<usize>,
}

/// JSONL 中的单帧记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame_index: i32,
    pub timestamp_ns: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_file: Option<String>,
    #[serde(default)]
    pub pose: Option<Pose>,
    #[serde(default)]
    pub tracking_state: PositionalTrackingState,
    #[serde(default)]
    pub objects: Vec<ObjectData>,
    #[serde(default)]
    pub bodies: Vec<BodyData>,
}

/// A loaded recording directory.
#[derive(Debug, Clone)]
pub struct Recording {
    pub root: PathBuf,
    pub manifest: RecordingManifest,
    pub frames: Vec<FrameRecord>,
}

impl Recording {
    pub fn load(root: &Path) -> Result<Self> {
        let manifest_path = root.join(MANIFEST_FILE);
        let manifest_text = std::fs::read_to_string(&manifest_path)
            .map_err(|e| RecordingError::io(manifest_path.display().to_string(), e))?;
        let manifest: RecordingManifest =
            serde_json::from_str(&manifest_text).map_err(|e| RecordingError::Manifest {
                message: e.to_string(),
            })?;

        let frames_path = root.join(FRAMES_FILE);
        let file = File::open(&frames_path)
            .map_err(|e| RecordingError::io(frames_path.display().to_string(), e))?;

        let mut frames = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| RecordingError::io(frames_path.display().to_string(), e))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: FrameRecord =
                serde_json::from_str(&line).map_err(|e| RecordingError::Record {
                    line: idx + 1,
                    message: e.to_string(),
                })?;
            frames.push(record);
        }

        if frames.is_empty() {
            return Err(RecordingError::Empty {
                path: root.display().to_string(),
            });
        }
        frames.sort_by_key(|f| f.frame_index);

        if let Some(expected) = manifest.frame_count {
            if expected != frames.len() {
                warn!(
                    expected,
                    found = frames.len(),
                    "recording frame count differs from manifest"
                );
            }
        }

        info!(
            path = %root.display(),
            frames = frames.len(),
            model = ?manifest.camera_model,
            "loaded recording"
        );

        Ok(Self {
            root: root.to_path_buf(),
            manifest,
            frames,
        })
    }

    /// Write `manifest.json` and `frames.jsonl` under `root`.
    pub fn write(root: &Path, manifest: &RecordingManifest, frames: &[FrameRecord]) -> Result<()> {
        std::fs::create_dir_all(root)
            .map_err(|e| RecordingError::io(root.display().to_string(), e))?;

        let manifest_path = root.join(MANIFEST_FILE);
        let manifest_text =
            serde_json::to_string_pretty(manifest).map_err(|e| RecordingError::Manifest {
                message: e.to_string(),
            })?;
        std::fs::write(&manifest_path, manifest_text)
            .map_err(|e| RecordingError::io(manifest_path.display().to_string(), e))?;

        let frames_path = root.join(FRAMES_FILE);
        let io_err = |e| RecordingError::io(frames_path.display().to_string(), e);
        let mut writer = BufWriter::new(File::create(&frames_path).map_err(io_err)?);
        for (idx, frame) in frames.iter().enumerate() {
            let line = serde_json::to_string(frame).map_err(|e| RecordingError::Record {
                line: idx + 1,
                message: e.to_string(),
            })?;
            writeln!(writer, "{line}").map_err(io_err)?;
        }
        writer.flush().map_err(io_err)?;
        Ok(())
    }

    pub fn duration_ns(&self) -> u64 {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => last.timestamp_ns.saturating_sub(first.timestamp_ns),
            _ => 0,
        }
    }

    fn read_binary(&self, relative: &str) -> Option<Bytes> {
        let path = self.root.join(relative);
        match std::fs::read(&path) {
            Ok(data) => Some(Bytes::from(data)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read recorded buffer");
                None
            }
        }
    }
}

#[derive(Default)]
struct ReplayState {
    recording: Option<Arc<Recording>>,
    real_time: bool,
    current: i32,
    next: i32,
    tracking: Option<TrackingOrigin>,
    objects: Option<ObjectDetectionParameters>,
    bodies: Option<BodyTrackingParameters>,
    objects_fresh: bool,
    bodies_fresh: bool,
    last_grab: Option<(Instant, u64)>,
}

impl ReplayState {
    fn recording(&self) -> DeviceResult<&Arc<Recording>> {
        self.recording.as_ref().ok_or(DeviceError::CameraNotInitialized)
    }

    fn frame(&self) -> DeviceResult<&FrameRecord> {
        let recording = self.recording()?;
        recording
            .frames
            .get(self.current.max(0) as usize)
            .ok_or(DeviceError::CorruptedFrame)
    }

    fn raw_pose(&self) -> Pose {
        self.frame()
            .ok()
            .and_then(|f| f.pose)
            .unwrap_or_else(Pose::identity)
    }
}

/// Replay camera - recorded session directory as a depth camera
#[derive(Default)]
pub struct ReplayCamera {
    state: Mutex<ReplayState>,
}

impl ReplayCamera {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer(
        recording: &Recording,
        file: Option<&String>,
        format: ImageFormat,
    ) -> DeviceResult<ImageBuffer> {
        let manifest = &recording.manifest;
        let Some(file) = file else {
            return Ok(ImageBuffer::blank(manifest.width, manifest.height, format));
        };
        let data = recording
            .read_binary(file)
            .ok_or(DeviceError::CorruptedFrame)?;
        Ok(ImageBuffer {
            width: manifest.width,
            height: manifest.height,
            format,
            data,
        })
    }
}

impl DepthCamera for ReplayCamera {
    fn open(&self, params: &InitParameters) -> DeviceResult<()> {
        let InputSource::RecordedFile {
            path, real_time, ..
        } = &params.input
        else {
            return Err(DeviceError::InvalidFunctionParameters);
        };

        let recording = Recording::load(path).map_err(|e| {
            warn!(path = %path.display(), error = %e, "cannot open recording");
            DeviceError::InvalidSvoFile
        })?;

        *self.state.lock() = ReplayState {
            recording: Some(Arc::new(recording)),
            real_time: *real_time,
            ..ReplayState::default()
        };
        Ok(())
    }

    fn close(&self) {
        *self.state.lock() = ReplayState::default();
    }

    fn grab(&self, _params: &RuntimeParameters) -> DeviceResult<()> {
        let wait = {
            let state = self.state.lock();
            let recording = state.recording()?;
            let Some(next) = recording.frames.get(state.next.max(0) as usize) else {
                return Err(DeviceError::EndOfSvoFile);
            };
            match (state.real_time, state.last_grab) {
                (true, Some((at, ts))) => Duration::from_nanos(next.timestamp_ns.saturating_sub(ts))
                    .saturating_sub(at.elapsed()),
                _ => Duration::ZERO,
            }
        };
        if !wait.is_zero() {
            thread::sleep(wait);
        }

        let mut state = self.state.lock();
        let total = state.recording()?.frames.len() as i32;
        if state.next >= total {
            return Err(DeviceError::EndOfSvoFile);
        }
        state.current = state.next;
        state.next += 1;
        let timestamp_ns = state.frame()?.timestamp_ns;
        state.last_grab = Some((Instant::now(), timestamp_ns));
        state.objects_fresh = state.objects.is_some();
        state.bodies_fresh = state.bodies.is_some();
        Ok(())
    }

    fn camera_information(&self) -> DeviceResult<CameraInformation> {
        let state = self.state.lock();
        let manifest = &state.recording()?.manifest;
        Ok(CameraInformation {
            serial_number: manifest.serial_number,
            camera_model: manifest.camera_model,
            firmware_version: 0,
            width: manifest.width,
            height: manifest.height,
            fps: manifest.fps,
            calibration: manifest.calibration,
        })
    }

    fn image_timestamp_ns(&self) -> u64 {
        let state = self.state.lock();
        state.last_grab.map(|(_, ts)| ts).unwrap_or(0)
    }

    fn retrieve_image(&self, _view: View) -> DeviceResult<ImageBuffer> {
        let state = self.state.lock();
        let frame = state.frame()?;
        Self::buffer(state.recording()?, frame.image_file.as_ref(), ImageFormat::Bgra8)
    }

    fn retrieve_measure(&self, measure: Measure) -> DeviceResult<ImageBuffer> {
        let state = self.state.lock();
        let frame = state.frame()?;
        let file = match measure {
            Measure::Depth => frame.depth_file.as_ref(),
            _ => None,
        };
        Self::buffer(state.recording()?, file, measure.format())
    }

    fn enable_tracking(&self, params: &TrackingParameters) -> DeviceResult<()> {
        let mut state = self.state.lock();
        state.recording()?;
        let anchor = state.raw_pose();
        state.tracking = Some(TrackingOrigin::new(params.initial_pose, &anchor));
        Ok(())
    }

    fn disable_tracking(&self, _area_file: Option<&Path>) {
        self.state.lock().tracking = None;
    }

    fn reset_tracking(&self, pose: &Pose) -> DeviceResult<()> {
        let mut state = self.state.lock();
        if state.tracking.is_none() {
            return Err(DeviceError::InvalidFunctionCall);
        }
        let anchor = state.raw_pose();
        state.tracking = Some(TrackingOrigin::new(*pose, &anchor));
        Ok(())
    }

    fn get_position(&self, _reference: ReferenceFrame) -> (PositionalTrackingState, Pose) {
        let state = self.state.lock();
        match (&state.tracking, state.frame()) {
            (Some(origin), Ok(frame)) => {
                let raw = frame.pose.unwrap_or_else(Pose::identity);
                (frame.tracking_state, origin.rebase(&raw))
            }
            _ => (PositionalTrackingState::Off, Pose::identity()),
        }
    }

    fn enable_object_detection(&self, params: &ObjectDetectionParameters) -> DeviceResult<()> {
        let mut state = self.state.lock();
        state.recording()?;
        state.objects = Some(params.clone());
        Ok(())
    }

    fn disable_object_detection(&self) {
        self.state.lock().objects = None;
    }

    fn retrieve_objects(&self, runtime: &ObjectDetectionRuntime) -> DeviceResult<ObjectsBatch> {
        let mut state = self.state.lock();
        let tracked = match &state.objects {
            Some(params) => params.enable_tracking,
            None => return Err(DeviceError::InvalidFunctionCall),
        };
        let is_new = std::mem::replace(&mut state.objects_fresh, false);
        let frame = state.frame()?;
        Ok(ObjectsBatch {
            timestamp_ns: frame.timestamp_ns,
            is_new,
            is_tracked: tracked,
            objects: frame
                .objects
                .iter()
                .filter(|o| o.confidence >= f32::from(runtime.confidence.threshold(o.label)))
                .cloned()
                .collect(),
        })
    }

    fn enable_body_tracking(&self, params: &BodyTrackingParameters) -> DeviceResult<()> {
        let mut state = self.state.lock();
        state.recording()?;
        state.bodies = Some(params.clone());
        Ok(())
    }

    fn disable_body_tracking(&self) {
        self.state.lock().bodies = None;
    }

    fn retrieve_bodies(&self, runtime: &BodyTrackingRuntime) -> DeviceResult<BodiesBatch> {
        let mut state = self.state.lock();
        let tracked = match &state.bodies {
            Some(params) => params.enable_tracking,
            None => return Err(DeviceError::InvalidFunctionCall),
        };
        let is_new = std::mem::replace(&mut state.bodies_fresh, false);
        let frame = state.frame()?;
        Ok(BodiesBatch {
            timestamp_ns: frame.timestamp_ns,
            is_new,
            is_tracked: tracked,
            bodies: frame
                .bodies
                .iter()
                .filter(|b| b.confidence >= f32::from(runtime.confidence_threshold))
                .cloned()
                .collect(),
        })
    }

    fn svo_position(&self) -> i32 {
        self.state.lock().current
    }

    fn set_svo_position(&self, frame: i32) {
        let mut state = self.state.lock();
        let Some(total) = state.recording.as_ref().map(|r| r.frames.len() as i32) else {
            return;
        };
        let frame = frame.clamp(0, (total - 1).max(0));
        state.current = frame;
        state.next = frame;
        state.last_grab = None;
        debug!(frame, "replay cursor moved");
    }

    fn svo_number_of_frames(&self) -> i32 {
        self.state
            .lock()
            .recording
            .as_ref()
            .map(|r| r.frames.len() as i32)
            .unwrap_or(0)
    }

    fn camera_setting(&self, _setting: VideoSetting) -> DeviceResult<i32> {
        Err(DeviceError::NotSupported)
    }

    fn set_camera_setting(&self, _setting: VideoSetting, _value: i32) -> DeviceResult<()> {
        Err(DeviceError::NotSupported)
    }
}

/// Backend that serves recorded sessions.
#[derive(Debug, Default)]
pub struct ReplayBackend;

impl ReplayBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CameraBackend for ReplayBackend {
    fn name(&self) -> &str {
        "replay"
    }

    fn create_camera(&self, _input: &InputSource) -> Arc<dyn DepthCamera> {
        Arc::new(ReplayCamera::new())
    }

    fn device_list(&self) -> Vec<DeviceProperties> {
        Vec::new()
    }

    fn reboot(&self, _serial: u32) -> DeviceResult<()> {
        Err(DeviceError::NotSupported)
    }

    fn model_status(&self, _model: AiModel) -> ModelStatus {
        // Results are prerecorded; no engine is involved.
        ModelStatus {
            downloaded: true,
            optimized: true,
        }
    }

    fn optimize_model(&self, _model: AiModel) -> DeviceResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{EntityTrackingState, ObjectClass, SessionConfig};

    fn manifest() -> RecordingManifest {
        RecordingManifest {
            version: "1".into(),
            camera_model: CameraModel::Zed2,
            serial_number: 1234,
            width: 4,
            height: 2,
            fps: 30.0,
            calibration: CalibrationParameters::default(),
            frame_count: Some(3),
        }
    }

    fn frames() -> Vec<FrameRecord> {
        (0..3)
            .map(|i| FrameRecord {
                frame_index: i,
                timestamp_ns: 1_000 + i as u64 * 33_000_000,
                image_file: (i == 1).then(|| "left_1.raw".to_string()),
                depth_file: None,
                pose: Some(Pose::new([i as f32, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0])),
                tracking_state: PositionalTrackingState::Ok,
                objects: vec![ObjectData {
                    id: 1,
                    label: ObjectClass::Person,
                    confidence: if i == 2 { 20.0 } else { 90.0 },
                    position: [0.0, 0.0, 2.0],
                    velocity: [0.0; 3],
                    dimensions: [0.5, 1.7, 0.3],
                    bounding_box_2d: [[0, 0], [1, 0], [1, 1], [0, 1]],
                    tracking_state: EntityTrackingState::Ok,
                    mask: None,
                }],
                bodies: vec![],
            })
            .collect()
    }

    fn open_recording(dir: &Path) -> ReplayCamera {
        let mut config = SessionConfig::live("replay");
        config.input = InputSource::RecordedFile {
            path: dir.to_path_buf(),
            loop_playback: false,
            real_time: false,
        };
        let camera = ReplayCamera::new();
        camera.open(&config.to_init_parameters()).unwrap();
        camera
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        Recording::write(dir.path(), &manifest(), &frames()).unwrap();

        let recording = Recording::load(dir.path()).unwrap();
        assert_eq!(recording.frames.len(), 3);
        assert_eq!(recording.manifest, manifest());
        assert_eq!(recording.duration_ns(), 66_000_000);
    }

    #[test]
    fn missing_directory_is_invalid_svo() {
        let mut config = SessionConfig::live("replay");
        config.input = InputSource::RecordedFile {
            path: "/nonexistent/recording".into(),
            loop_playback: false,
            real_time: false,
        };
        let camera = ReplayCamera::new();
        assert_eq!(
            camera.open(&config.to_init_parameters()),
            Err(DeviceError::InvalidSvoFile)
        );
    }

    #[test]
    fn playback_reads_buffers_and_ends() {
        let dir = tempfile::tempdir().unwrap();
        Recording::write(dir.path(), &manifest(), &frames()).unwrap();
        std::fs::write(dir.path().join("left_1.raw"), [7u8; 32]).unwrap();

        let camera = open_recording(dir.path());
        let params = RuntimeParameters::default();

        camera.grab(&params).unwrap();
        assert_eq!(camera.retrieve_image(View::Left).unwrap().data[0], 0);

        camera.grab(&params).unwrap();
        assert_eq!(camera.svo_position(), 1);
        assert_eq!(camera.retrieve_image(View::Left).unwrap().data[0], 7);

        camera.grab(&params).unwrap();
        assert_eq!(camera.grab(&params), Err(DeviceError::EndOfSvoFile));
    }

    #[test]
    fn recorded_poses_follow_tracking_origin() {
        let dir = tempfile::tempdir().unwrap();
        Recording::write(dir.path(), &manifest(), &frames()).unwrap();
        let camera = open_recording(dir.path());

        let origin = Pose::new([10.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]);
        camera
            .enable_tracking(&TrackingParameters {
                initial_pose: origin,
                ..Default::default()
            })
            .unwrap();
        camera.grab(&RuntimeParameters::default()).unwrap();
        camera.grab(&RuntimeParameters::default()).unwrap();

        let (state, pose) = camera.get_position(ReferenceFrame::World);
        assert_eq!(state, PositionalTrackingState::Ok);
        assert!((pose.translation.x - 11.0).abs() < 1e-5);
    }

    #[test]
    fn low_confidence_objects_are_filtered() {
        let dir = tempfile::tempdir().unwrap();
        Recording::write(dir.path(), &manifest(), &frames()).unwrap();
        let camera = open_recording(dir.path());
        camera
            .enable_object_detection(&ObjectDetectionParameters::default())
            .unwrap();

        camera.set_svo_position(2);
        camera.grab(&RuntimeParameters::default()).unwrap();
        let batch = camera
            .retrieve_objects(&ObjectDetectionRuntime::default())
            .unwrap();
        assert!(batch.is_new);
        assert!(batch.objects.is_empty());
    }
}
