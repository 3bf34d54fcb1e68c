//! Session 错误类型
//!
//! Device codes are translated here into the failure taxonomy consumers
//! branch on; the original code stays available through `device_code()`.

use acquisition::{AcquisitionError, TrackingError};
use contracts::{AiModel, DeviceError};
use perception::PerceptionError;
use thiserror::Error;

use crate::session::SessionState;

/// How a failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Surfaced immediately, never retried
    FatalToAttempt,
    /// Retried under the configured policy
    Transient,
    /// Drives a disconnect/recovery cycle
    RecoverableAtRuntime,
    /// Feature turned off, session continues
    Degradable,
    /// Budget exceeded; needs external remediation
    Timeout,
}

/// Copyable failure code carried by `InitializationProgress::Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCode {
    OpenFailed,
    CameraNotInitialized,
    OptimizationTimeout,
    OptimizationFailed,
    TrackingFailed,
    Cancelled,
    Internal,
}

/// 会话错误
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to open camera after {attempts} attempt(s): {source}")]
    OpenFailed {
        attempts: u32,
        #[source]
        source: DeviceError,
    },

    #[error("camera reported invalid frame dimensions {width}x{height}")]
    CameraNotInitialized { width: u32, height: u32 },

    #[error("camera information unavailable: {source}")]
    CameraInformation {
        #[source]
        source: DeviceError,
    },

    #[error("optimization of {model} did not finish within {timeout_secs}s")]
    OptimizationTimeout { model: AiModel, timeout_secs: u64 },

    #[error("optimization of {model} failed: {source}")]
    OptimizationFailed {
        model: AiModel,
        #[source]
        source: DeviceError,
    },

    #[error("positional tracking failed to start: {source}")]
    TrackingFailed {
        #[source]
        source: DeviceError,
    },

    #[error(transparent)]
    InvalidTrackingState(TrackingError),

    #[error("tracking reset failed: {source}")]
    TrackingResetFailed {
        #[source]
        source: DeviceError,
    },

    #[error("camera disconnected")]
    Disconnected,

    #[error("reboot command failed: {source}")]
    RebootFailed {
        #[source]
        source: DeviceError,
    },

    #[error("camera {serial} did not reappear within {waited_secs}s after reboot")]
    RebootTimeout { serial: u32, waited_secs: u64 },

    #[error("no serial number known for reboot")]
    RebootUnavailable,

    #[error("{pipeline} is already starting")]
    AlreadyStarting { pipeline: &'static str },

    #[error("failed to start {pipeline}: {source}")]
    PipelineStart {
        pipeline: &'static str,
        #[source]
        source: PerceptionError,
    },

    #[error("camera setting rejected: {source}")]
    Setting {
        #[source]
        source: DeviceError,
    },

    #[error("session is {state:?}, not ready")]
    NotReady { state: SessionState },

    #[error("session {camera_id} already exists")]
    DuplicateSession { camera_id: String },

    #[error("initialization cancelled")]
    Cancelled,

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl SessionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SessionError::OpenFailed { source, .. } if source.is_fatal_to_open() => {
                FailureKind::FatalToAttempt
            }
            SessionError::OpenFailed { .. } => FailureKind::Transient,
            SessionError::OptimizationTimeout { .. } | SessionError::RebootTimeout { .. } => {
                FailureKind::Timeout
            }
            SessionError::PipelineStart {
                source: PerceptionError::OptimizationTimeout { .. },
                ..
            } => FailureKind::Timeout,
            SessionError::Disconnected => FailureKind::RecoverableAtRuntime,
            SessionError::TrackingResetFailed { .. } => FailureKind::Degradable,
            SessionError::AlreadyStarting { .. }
            | SessionError::NotReady { .. }
            | SessionError::Cancelled => FailureKind::Transient,
            _ => FailureKind::FatalToAttempt,
        }
    }

    /// Original driver code, for diagnostics.
    pub fn device_code(&self) -> Option<i32> {
        self.device_error().map(DeviceError::code)
    }

    fn device_error(&self) -> Option<&DeviceError> {
        match self {
            SessionError::OpenFailed { source, .. }
            | SessionError::CameraInformation { source }
            | SessionError::OptimizationFailed { source, .. }
            | SessionError::TrackingFailed { source }
            | SessionError::TrackingResetFailed { source }
            | SessionError::RebootFailed { source }
            | SessionError::Setting { source } => Some(source),
            SessionError::InvalidTrackingState(
                TrackingError::EnableFailed { source } | TrackingError::ResetFailed { source },
            ) => Some(source),
            SessionError::PipelineStart { source, .. } => source.device_error(),
            _ => None,
        }
    }

    pub fn code(&self) -> FailureCode {
        match self {
            SessionError::OpenFailed { .. } => FailureCode::OpenFailed,
            SessionError::CameraNotInitialized { .. } | SessionError::CameraInformation { .. } => {
                FailureCode::CameraNotInitialized
            }
            SessionError::OptimizationTimeout { .. } => FailureCode::OptimizationTimeout,
            SessionError::OptimizationFailed { .. } => FailureCode::OptimizationFailed,
            SessionError::TrackingFailed { .. } => FailureCode::TrackingFailed,
            SessionError::Cancelled => FailureCode::Cancelled,
            _ => FailureCode::Internal,
        }
    }
}

impl From<TrackingError> for SessionError {
    fn from(e: TrackingError) -> Self {
        match e {
            TrackingError::ResetFailed { source } => SessionError::TrackingResetFailed { source },
            TrackingError::EnableFailed { source } => SessionError::TrackingFailed { source },
            other => SessionError::InvalidTrackingState(other),
        }
    }
}

/// Optimization failures during initialization map onto their own variants.
impl From<PerceptionError> for SessionError {
    fn from(e: PerceptionError) -> Self {
        match e {
            PerceptionError::OptimizationTimeout {
                model,
                timeout_secs,
            } => SessionError::OptimizationTimeout {
                model,
                timeout_secs,
            },
            PerceptionError::OptimizationFailed { model, source } => {
                SessionError::OptimizationFailed { model, source }
            }
            PerceptionError::AlreadyStarting { pipeline } => {
                SessionError::AlreadyStarting { pipeline }
            }
            PerceptionError::Spawn { name, source } => SessionError::Spawn { name, source },
            PerceptionError::EnableFailed { pipeline, source } => SessionError::PipelineStart {
                pipeline,
                source: PerceptionError::EnableFailed { pipeline, source },
            },
        }
    }
}

/// Session Result 类型别名
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_failures_split_by_device_code() {
        let fatal = SessionError::OpenFailed {
            attempts: 1,
            source: DeviceError::InvalidSvoFile,
        };
        let transient = SessionError::OpenFailed {
            attempts: 1,
            source: DeviceError::CameraNotDetected,
        };
        assert_eq!(fatal.kind(), FailureKind::FatalToAttempt);
        assert_eq!(transient.kind(), FailureKind::Transient);
        assert_eq!(fatal.device_code(), Some(DeviceError::InvalidSvoFile.code()));
    }

    #[test]
    fn taxonomy_covers_runtime_failures() {
        assert_eq!(
            SessionError::Disconnected.kind(),
            FailureKind::RecoverableAtRuntime
        );
        assert_eq!(
            SessionError::TrackingResetFailed {
                source: DeviceError::Failure
            }
            .kind(),
            FailureKind::Degradable
        );
        assert_eq!(
            SessionError::RebootTimeout {
                serial: 1,
                waited_secs: 30
            }
            .kind(),
            FailureKind::Timeout
        );
    }

    #[test]
    fn tracking_errors_are_categorized() {
        let reset: SessionError = TrackingError::ResetFailed {
            source: DeviceError::Failure,
        }
        .into();
        assert_eq!(reset.kind(), FailureKind::Degradable);

        let state: SessionError = TrackingError::NotEnabled {
            mode: acquisition::TrackingMode::Off,
        }
        .into();
        assert!(matches!(state, SessionError::InvalidTrackingState(_)));
        assert_eq!(state.device_code(), None);
    }

    #[test]
    fn optimization_timeout_maps_to_timeout() {
        let err: SessionError = PerceptionError::OptimizationTimeout {
            model: AiModel::NeuralDepth,
            timeout_secs: 600,
        }
        .into();
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert_eq!(err.code(), FailureCode::OptimizationTimeout);
    }
}
