//! Depth-camera driver abstraction
//!
//! `DepthCamera` is one opened (or openable) device; `CameraBackend` is the
//! process-wide driver surface that creates cameras and handles discovery,
//! reboot and model optimization. Simulated and recorded sources implement
//! the same traits as hardware drivers.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    AiModel, BodiesBatch, BodyTrackingParameters, BodyTrackingRuntime, CameraInformation,
    DeviceError, DeviceProperties, ImageBuffer, InputSource, Measure, ModelStatus,
    ObjectDetectionParameters, ObjectDetectionRuntime, ObjectsBatch, Pose,
    PositionalTrackingState, ReferenceFrame, Resolution, TrackingParameters, VideoSetting, View,
};

/// Result of a driver call.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthMode {
    None,
    #[default]
    Performance,
    Quality,
    Ultra,
    Neural,
    NeuralPlus,
}

impl DepthMode {
    /// Neural depth modes run on an inference engine that must be optimized first.
    pub fn requires_model(&self) -> Option<AiModel> {
        match self {
            DepthMode::Neural | DepthMode::NeuralPlus => Some(AiModel::NeuralDepth),
            _ => None,
        }
    }
}

/// Everything the driver needs to open a device.
#[derive(Debug, Clone, PartialEq)]
pub struct InitParameters {
    pub input: InputSource,
    pub resolution: Resolution,
    pub fps: u32,
    pub depth_mode: DepthMode,
    pub depth_minimum_distance_m: f32,
    pub depth_maximum_distance_m: f32,
    pub async_grab_camera_recovery: bool,
}

/// Per-grab parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeParameters {
    pub enable_depth: bool,
    pub confidence_threshold: u8,
    pub texture_confidence_threshold: u8,
    pub measure_reference_frame: ReferenceFrame,
}

impl Default for RuntimeParameters {
    fn default() -> Self {
        Self {
            enable_depth: true,
            confidence_threshold: 95,
            texture_confidence_threshold: 100,
            measure_reference_frame: ReferenceFrame::World,
        }
    }
}

/// One depth camera handle.
///
/// Methods take `&self`: the driver serializes calls internally, so the
/// acquisition thread and the consumer thread may both hold the handle.
/// Anything that touches shared frame state is still coordinated by the
/// caller's coarse lock.
pub trait DepthCamera: Send + Sync {
    fn open(&self, params: &InitParameters) -> DeviceResult<()>;

    /// Release the device. Safe to call on a handle that never opened.
    fn close(&self);

    /// Block until the next synchronized image+depth sample is available.
    fn grab(&self, params: &RuntimeParameters) -> DeviceResult<()>;

    fn camera_information(&self) -> DeviceResult<CameraInformation>;

    /// Capture timestamp of the last successful grab, nanoseconds.
    fn image_timestamp_ns(&self) -> u64;

    fn retrieve_image(&self, view: View) -> DeviceResult<ImageBuffer>;

    fn retrieve_measure(&self, measure: Measure) -> DeviceResult<ImageBuffer>;

    // ===== Positional tracking =====

    fn enable_tracking(&self, params: &TrackingParameters) -> DeviceResult<()>;

    /// Stop tracking, optionally exporting the spatial memory to `area_file`.
    fn disable_tracking(&self, area_file: Option<&Path>);

    /// Re-seed the tracking origin.
    fn reset_tracking(&self, pose: &Pose) -> DeviceResult<()>;

    fn get_position(&self, reference: ReferenceFrame) -> (PositionalTrackingState, Pose);

    // ===== Perception =====

    fn enable_object_detection(&self, params: &ObjectDetectionParameters) -> DeviceResult<()>;

    fn disable_object_detection(&self);

    fn retrieve_objects(&self, runtime: &ObjectDetectionRuntime) -> DeviceResult<ObjectsBatch>;

    fn enable_body_tracking(&self, params: &BodyTrackingParameters) -> DeviceResult<()>;

    fn disable_body_tracking(&self);

    fn retrieve_bodies(&self, runtime: &BodyTrackingRuntime) -> DeviceResult<BodiesBatch>;

    // ===== Recorded input =====

    /// Index of the current frame; 0 for live input.
    fn svo_position(&self) -> i32;

    fn set_svo_position(&self, frame: i32);

    /// Total frames in the recording; 0 for live input.
    fn svo_number_of_frames(&self) -> i32;

    // ===== Video settings =====

    fn camera_setting(&self, setting: VideoSetting) -> DeviceResult<i32>;

    fn set_camera_setting(&self, setting: VideoSetting, value: i32) -> DeviceResult<()>;
}

/// Process-wide driver entry points.
pub trait CameraBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Fresh, unopened handle for `input`.
    fn create_camera(&self, input: &InputSource) -> Arc<dyn DepthCamera>;

    fn device_list(&self) -> Vec<DeviceProperties>;

    /// Power-cycle the device with `serial`; it drops off the discovery list
    /// until it has restarted.
    fn reboot(&self, serial: u32) -> DeviceResult<()>;

    fn model_status(&self, model: AiModel) -> ModelStatus;

    /// Build the optimized engine for `model`. Blocks, possibly for minutes,
    /// and cannot be interrupted.
    fn optimize_model(&self, model: AiModel) -> DeviceResult<()>;
}
