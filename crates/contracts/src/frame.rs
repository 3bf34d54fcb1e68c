//! Frame buffers and camera identity
//!
//! 采集线程与消费线程之间传递的图像/测量缓冲区。

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::DeviceError;

/// Pixel or measurement buffer copied out of the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// 原始数据 (零拷贝)
    pub data: Bytes,
}

impl ImageBuffer {
    /// Zero-filled buffer of the right size for `format`.
    pub fn blank(width: u32, height: u32, format: ImageFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            data: Bytes::from(vec![0u8; len]),
        }
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Bgra8,
    Gray8,
    /// 32-bit float, meters
    Depth32F,
    /// 4 × f32 per pixel
    Xyzw32F,
}

impl ImageFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            ImageFormat::Bgra8 => 4,
            ImageFormat::Gray8 => 1,
            ImageFormat::Depth32F => 4,
            ImageFormat::Xyzw32F => 16,
        }
    }
}

/// Displayable image views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Left,
    Right,
    DepthVisual,
}

/// Raw measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    Depth,
    Confidence,
    PointCloud,
}

impl Measure {
    pub fn format(&self) -> ImageFormat {
        match self {
            Measure::Depth | Measure::Confidence => ImageFormat::Depth32F,
            Measure::PointCloud => ImageFormat::Xyzw32F,
        }
    }
}

/// Most recent grab as seen by the consumer.
#[derive(Debug, Clone)]
pub struct FrameSlot {
    /// Capture timestamp, nanoseconds
    pub timestamp_ns: u64,
    /// Count of successful grabs since the session opened
    pub frame_index: u64,
    pub image: ImageBuffer,
    pub depth: Option<ImageBuffer>,
    /// Last transient grab failure seen before this frame, if any
    pub grab_error: Option<DeviceError>,
}

/// Capture resolution presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Hd2k,
    Hd1080,
    Hd1200,
    #[default]
    Hd720,
    Svga,
    Vga,
    /// Let the driver pick.
    Auto,
}

impl Resolution {
    /// (width, height); `None` for [`Resolution::Auto`].
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Resolution::Hd2k => Some((2208, 1242)),
            Resolution::Hd1080 => Some((1920, 1080)),
            Resolution::Hd1200 => Some((1920, 1200)),
            Resolution::Hd720 => Some((1280, 720)),
            Resolution::Svga => Some((960, 600)),
            Resolution::Vga => Some((672, 376)),
            Resolution::Auto => None,
        }
    }

    pub fn default_fps(&self) -> u32 {
        match self {
            Resolution::Hd2k => 15,
            Resolution::Hd1080 | Resolution::Hd1200 => 30,
            Resolution::Hd720 | Resolution::Svga | Resolution::Auto => 60,
            Resolution::Vga => 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraModel {
    Zed,
    ZedMini,
    Zed2,
    Zed2i,
    ZedX,
    ZedXMini,
    /// Simulated or recorded source with no physical model.
    Virtual,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    /// k1, k2, p1, p2, k3
    pub distortion: [f64; 5],
    pub vertical_fov_deg: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationParameters {
    pub left: CameraIntrinsics,
    pub right: CameraIntrinsics,
    /// Stereo baseline, meters
    pub baseline_m: f32,
}

/// Identity and geometry derived once the device opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInformation {
    pub serial_number: u32,
    pub camera_model: CameraModel,
    pub firmware_version: u32,
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    pub calibration: CalibrationParameters,
}

impl CameraInformation {
    pub fn has_valid_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// One entry of the device discovery list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProperties {
    pub id: i32,
    pub serial_number: u32,
    pub camera_model: CameraModel,
    pub state: DeviceState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Available,
    NotAvailable,
}

/// Video settings the driver exposes for get/set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoSetting {
    Brightness,
    Contrast,
    Hue,
    Saturation,
    Sharpness,
    Gamma,
    Gain,
    Exposure,
    AecAgc,
    WhiteBalanceTemperature,
    WhiteBalanceAuto,
    LedStatus,
}

impl VideoSetting {
    /// Accepted value range; white balance is in Kelvin and is not rescaled.
    pub fn range(&self) -> (i32, i32) {
        match self {
            VideoSetting::Brightness
            | VideoSetting::Contrast
            | VideoSetting::Hue
            | VideoSetting::Saturation
            | VideoSetting::Sharpness
            | VideoSetting::Gamma => (0, 8),
            VideoSetting::Gain | VideoSetting::Exposure => (0, 100),
            VideoSetting::AecAgc | VideoSetting::WhiteBalanceAuto | VideoSetting::LedStatus => {
                (0, 1)
            }
            VideoSetting::WhiteBalanceTemperature => (2800, 6500),
        }
    }
}
