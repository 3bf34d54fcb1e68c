//! SessionConfig - Config Loader 输出
//!
//! 描述一个相机会话的完整配置：输入源、深度、跟踪、感知管线、恢复策略。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{
    AiModel, BodyFormat, BodyTrackingModel, BodyTrackingParameters, BodyTrackingRuntime,
    CameraId, ClassConfidence, DepthMode, InitParameters, ObjectDetectionModel,
    ObjectDetectionParameters, ObjectDetectionRuntime, Pose, Resolution, TrackingParameters,
};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Open-timeout sentinel: keep retrying until the device appears.
pub const OPEN_RETRY_FOREVER: i32 = -1;

/// 完整的会话配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub version: ConfigVersion,

    pub camera_id: CameraId,

    /// 输入源
    pub input: InputSource,

    #[serde(default)]
    pub resolution: Resolution,

    /// 0 = resolution default
    #[serde(default)]
    pub fps: u32,

    #[serde(default)]
    pub depth: DepthConfig,

    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Seconds; -1 retries forever, 0 fails after one attempt.
    #[serde(default = "default_open_timeout")]
    pub open_timeout_sec: i32,

    #[serde(default)]
    pub async_grab_camera_recovery: bool,

    #[serde(default)]
    pub object_detection: ObjectDetectionConfig,

    #[serde(default)]
    pub body_tracking: BodyTrackingConfig,

    #[serde(default)]
    pub optimization: OptimizationConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,
}

fn default_open_timeout() -> i32 {
    OPEN_RETRY_FOREVER
}

/// 输入源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputSource {
    Live {
        #[serde(default)]
        serial_number: Option<u32>,
        #[serde(default)]
        device_id: Option<u32>,
    },
    RecordedFile {
        path: PathBuf,
        #[serde(default = "default_true")]
        loop_playback: bool,
        #[serde(default)]
        real_time: bool,
    },
    NetworkStream {
        ip: String,
        #[serde(default = "default_stream_port")]
        port: u16,
    },
}

impl Default for InputSource {
    fn default() -> Self {
        InputSource::Live {
            serial_number: None,
            device_id: None,
        }
    }
}

impl InputSource {
    pub fn kind(&self) -> InputKind {
        match self {
            InputSource::Live { .. } => InputKind::Live,
            InputSource::RecordedFile { .. } => InputKind::RecordedFile,
            InputSource::NetworkStream { .. } => InputKind::NetworkStream,
        }
    }

    /// Loop flag of a recorded input; always false otherwise.
    pub fn loops(&self) -> bool {
        matches!(
            self,
            InputSource::RecordedFile {
                loop_playback: true,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Live,
    RecordedFile,
    NetworkStream,
}

fn default_true() -> bool {
    true
}

fn default_stream_port() -> u16 {
    30000
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthConfig {
    pub mode: DepthMode,
    pub minimum_distance_m: f32,
    pub maximum_distance_m: f32,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            mode: DepthMode::Performance,
            minimum_distance_m: 0.3,
            maximum_distance_m: 20.0,
        }
    }
}

/// 位置跟踪配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub enabled: bool,
    pub enable_area_memory: bool,
    /// Spatial memory file (`.area`), loaded on enable and saved on disable.
    pub area_memory_path: Option<PathBuf>,
    pub floor_as_origin: bool,
    pub set_gravity_as_origin: bool,
    pub enable_pose_smoothing: bool,
    pub enable_imu_fusion: bool,
    pub set_as_static: bool,
    pub initial_position: [f32; 3],
    /// Quaternion `[x, y, z, w]`
    pub initial_rotation: [f32; 4],
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            enable_area_memory: false,
            area_memory_path: None,
            floor_as_origin: false,
            set_gravity_as_origin: true,
            enable_pose_smoothing: false,
            enable_imu_fusion: true,
            set_as_static: false,
            initial_position: [0.0; 3],
            initial_rotation: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl TrackingConfig {
    pub fn initial_pose(&self) -> Pose {
        Pose::new(self.initial_position, self.initial_rotation)
    }
}

/// 目标检测配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectDetectionConfig {
    /// Start the pipeline as soon as the session becomes ready.
    pub start_on_ready: bool,
    pub model: ObjectDetectionModel,
    pub image_sync: bool,
    pub enable_tracking: bool,
    pub enable_segmentation: bool,
    pub max_range_m: f32,
    pub confidence: ClassConfidence,
}

impl Default for ObjectDetectionConfig {
    fn default() -> Self {
        Self {
            start_on_ready: false,
            model: ObjectDetectionModel::default(),
            image_sync: true,
            enable_tracking: true,
            enable_segmentation: false,
            max_range_m: 20.0,
            confidence: ClassConfidence::default(),
        }
    }
}

/// 人体跟踪配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyTrackingConfig {
    pub start_on_ready: bool,
    pub model: BodyTrackingModel,
    pub format: BodyFormat,
    pub image_sync: bool,
    pub enable_tracking: bool,
    pub enable_body_fitting: bool,
    pub enable_segmentation: bool,
    pub max_range_m: f32,
    pub confidence_threshold: u8,
    pub minimum_keypoints_threshold: u32,
}

impl Default for BodyTrackingConfig {
    fn default() -> Self {
        Self {
            start_on_ready: false,
            model: BodyTrackingModel::default(),
            format: BodyFormat::default(),
            image_sync: true,
            enable_tracking: true,
            enable_body_fitting: true,
            enable_segmentation: false,
            max_range_m: 20.0,
            confidence_threshold: 50,
            minimum_keypoints_threshold: 0,
        }
    }
}

/// 模型优化配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    pub timeout_sec: u64,
    pub poll_interval_ms: u64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            timeout_sec: 600,
            poll_interval_ms: 5000,
        }
    }
}

/// 断线恢复配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Close and reopen automatically when the device disappears mid-session.
    pub auto_reconnect: bool,
    pub reboot_discovery_timeout_sec: u64,
    pub reboot_poll_interval_ms: u64,
    pub open_retry_interval_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            reboot_discovery_timeout_sec: 30,
            reboot_poll_interval_ms: 1000,
            open_retry_interval_ms: 10,
        }
    }
}

impl SessionConfig {
    /// Minimal live-camera configuration with defaults everywhere else.
    pub fn live(camera_id: impl Into<CameraId>) -> Self {
        Self {
            version: ConfigVersion::V1,
            camera_id: camera_id.into(),
            input: InputSource::default(),
            resolution: Resolution::default(),
            fps: 0,
            depth: DepthConfig::default(),
            tracking: TrackingConfig::default(),
            open_timeout_sec: OPEN_RETRY_FOREVER,
            async_grab_camera_recovery: false,
            object_detection: ObjectDetectionConfig::default(),
            body_tracking: BodyTrackingConfig::default(),
            optimization: OptimizationConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }

    pub fn effective_fps(&self) -> u32 {
        if self.fps == 0 {
            self.resolution.default_fps()
        } else {
            self.fps
        }
    }

    pub fn to_init_parameters(&self) -> InitParameters {
        InitParameters {
            input: self.input.clone(),
            resolution: self.resolution,
            fps: self.effective_fps(),
            depth_mode: self.depth.mode,
            depth_minimum_distance_m: self.depth.minimum_distance_m,
            depth_maximum_distance_m: self.depth.maximum_distance_m,
            async_grab_camera_recovery: self.async_grab_camera_recovery,
        }
    }

    /// Tracking parameters; `origin` replaces the configured initial pose
    /// (used to carry the last known pose across a reconnect).
    pub fn to_tracking_parameters(&self, origin: Option<Pose>) -> TrackingParameters {
        let tracking = &self.tracking;
        TrackingParameters {
            initial_pose: origin.unwrap_or_else(|| tracking.initial_pose()),
            enable_area_memory: tracking.enable_area_memory,
            area_file_path: tracking.area_memory_path.clone(),
            enable_pose_smoothing: tracking.enable_pose_smoothing,
            set_floor_as_origin: tracking.floor_as_origin,
            set_gravity_as_origin: tracking.set_gravity_as_origin,
            enable_imu_fusion: tracking.enable_imu_fusion,
            set_as_static: tracking.set_as_static,
        }
    }

    pub fn to_object_detection_parameters(&self) -> ObjectDetectionParameters {
        let od = &self.object_detection;
        ObjectDetectionParameters {
            model: od.model,
            image_sync: od.image_sync,
            enable_tracking: od.enable_tracking,
            enable_segmentation: od.enable_segmentation,
            max_range_m: od.max_range_m,
        }
    }

    pub fn to_object_detection_runtime(&self) -> ObjectDetectionRuntime {
        ObjectDetectionRuntime {
            confidence: self.object_detection.confidence,
        }
    }

    pub fn to_body_tracking_parameters(&self) -> BodyTrackingParameters {
        let bt = &self.body_tracking;
        BodyTrackingParameters {
            model: bt.model,
            format: bt.format,
            image_sync: bt.image_sync,
            enable_tracking: bt.enable_tracking,
            enable_body_fitting: bt.enable_body_fitting,
            enable_segmentation: bt.enable_segmentation,
            max_range_m: bt.max_range_m,
        }
    }

    pub fn to_body_tracking_runtime(&self) -> BodyTrackingRuntime {
        BodyTrackingRuntime {
            confidence_threshold: self.body_tracking.confidence_threshold,
            minimum_keypoints_threshold: self.body_tracking.minimum_keypoints_threshold,
        }
    }

    /// Models that must be optimized before the session can open: neural
    /// depth, plus any pipeline configured to start on ready.
    pub fn required_models(&self) -> Vec<AiModel> {
        let mut models = Vec::new();
        if let Some(model) = self.depth.mode.requires_model() {
            models.push(model);
        }
        if self.object_detection.start_on_ready {
            if let Some(model) = self.object_detection.model.ai_model() {
                models.push(model);
            }
        }
        if self.body_tracking.start_on_ready {
            models.push(self.to_body_tracking_parameters().ai_model());
        }
        models
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModelAccuracy;

    #[test]
    fn live_defaults() {
        let config = SessionConfig::live("cam0");
        assert_eq!(config.open_timeout_sec, OPEN_RETRY_FOREVER);
        assert_eq!(config.effective_fps(), 60);
        assert!(config.tracking.enabled);
        assert!(config.required_models().is_empty());
    }

    #[test]
    fn tracking_origin_override_wins() {
        let mut config = SessionConfig::live("cam0");
        config.tracking.initial_position = [1.0, 0.0, 0.0];

        let configured = config.to_tracking_parameters(None);
        assert_eq!(configured.initial_pose.translation.x, 1.0);

        let carried = Pose::new([5.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]);
        let overridden = config.to_tracking_parameters(Some(carried));
        assert_eq!(overridden.initial_pose, carried);
    }

    #[test]
    fn required_models_follow_depth_and_auto_start() {
        let mut config = SessionConfig::live("cam0");
        config.depth.mode = DepthMode::Neural;
        config.object_detection.start_on_ready = true;
        config.object_detection.model = ObjectDetectionModel::MultiClassBoxMedium;

        assert_eq!(
            config.required_models(),
            vec![
                AiModel::NeuralDepth,
                AiModel::MultiClassDetection(ModelAccuracy::Medium)
            ]
        );
    }

    #[test]
    fn recorded_input_loops_by_default() {
        let input: InputSource =
            serde_json::from_str(r#"{"type":"recorded_file","path":"walk.svo2"}"#).unwrap();
        assert!(input.loops());
        assert_eq!(input.kind(), InputKind::RecordedFile);
    }
}
