//! Acquisition 错误类型

use contracts::DeviceError;
use thiserror::Error;

use crate::tracking::TrackingMode;

/// 位置跟踪错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackingError {
    /// 当前状态不允许该操作
    #[error("tracking is not enabled (mode {mode:?})")]
    NotEnabled { mode: TrackingMode },

    /// 已启用或正在启用
    #[error("tracking is already {mode:?}")]
    AlreadyEnabled { mode: TrackingMode },

    /// 驱动启用失败
    #[error("failed to enable tracking: {source}")]
    EnableFailed {
        #[source]
        source: DeviceError,
    },

    /// 驱动重置失败
    #[error("failed to reset tracking: {source}")]
    ResetFailed {
        #[source]
        source: DeviceError,
    },
}

/// 抓帧线程错误
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("acquisition for {camera_id} is already running")]
    AlreadyRunning { camera_id: String },

    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Acquisition Result 类型别名
pub type Result<T> = std::result::Result<T, AcquisitionError>;
