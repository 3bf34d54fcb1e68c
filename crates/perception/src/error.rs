//! Perception 错误类型

use contracts::{AiModel, DeviceError};
use thiserror::Error;

/// 感知管线错误
#[derive(Debug, Error)]
pub enum PerceptionError {
    /// 同一管线的启动已在进行中
    #[error("{pipeline} is already starting")]
    AlreadyStarting {
        pipeline: &'static str,
    },

    /// 模型优化超时
    #[error("optimization of {model} did not finish within {timeout_secs}s")]
    OptimizationTimeout { model: AiModel, timeout_secs: u64 },

    /// 模型优化失败
    #[error("optimization of {model} failed: {source}")]
    OptimizationFailed {
        model: AiModel,
        #[source]
        source: DeviceError,
    },

    /// 驱动拒绝启用管线
    #[error("failed to enable {pipeline}: {source}")]
    EnableFailed {
        pipeline: &'static str,
        #[source]
        source: DeviceError,
    },

    /// 后台线程创建失败
    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl PerceptionError {
    /// Device code behind the failure, if any.
    pub fn device_error(&self) -> Option<&DeviceError> {
        match self {
            PerceptionError::OptimizationFailed { source, .. }
            | PerceptionError::EnableFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Perception Result 类型别名
pub type Result<T> = std::result::Result<T, PerceptionError>;
