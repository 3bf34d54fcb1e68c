//! Layered error definitions
//!
//! `ContractError` covers configuration; `DeviceError` is the raw status a
//! depth-camera driver reports for a failed call.

use thiserror::Error;

/// Unified configuration error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== General Errors =====
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl ContractError {
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Non-success status returned by a driver call.
///
/// The numeric value from [`DeviceError::code`] is kept for diagnostics only;
/// callers above the acquisition/initialization boundary branch on the
/// categorized session errors instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("camera is rebooting")]
    CameraRebooting,

    #[error("corrupted frame")]
    CorruptedFrame,

    #[error("generic device failure")]
    Failure,

    #[error("camera not detected")]
    CameraNotDetected,

    #[error("invalid resolution")]
    InvalidResolution,

    #[error("low USB bandwidth")]
    LowUsbBandwidth,

    #[error("invalid or unreadable SVO file")]
    InvalidSvoFile,

    #[error("end of SVO file reached")]
    EndOfSvoFile,

    #[error("invalid function parameters")]
    InvalidFunctionParameters,

    #[error("camera not initialized")]
    CameraNotInitialized,

    #[error("invalid function call")]
    InvalidFunctionCall,

    #[error("invalid spatial memory area file")]
    InvalidAreaFile,

    #[error("module not compatible with this camera")]
    ModuleNotCompatible,

    #[error("operation not supported by this driver")]
    NotSupported,

    #[error("driver error code {0}")]
    Other(i32),
}

impl DeviceError {
    /// Driver status code for logs and diagnostics.
    pub fn code(&self) -> i32 {
        match self {
            DeviceError::CameraRebooting => -1,
            DeviceError::CorruptedFrame => -2,
            DeviceError::Failure => 1,
            DeviceError::CameraNotDetected => 4,
            DeviceError::InvalidResolution => 6,
            DeviceError::LowUsbBandwidth => 7,
            DeviceError::InvalidSvoFile => 10,
            DeviceError::EndOfSvoFile => 12,
            DeviceError::InvalidFunctionParameters => 15,
            DeviceError::CameraNotInitialized => 17,
            DeviceError::InvalidFunctionCall => 19,
            DeviceError::InvalidAreaFile => 22,
            DeviceError::ModuleNotCompatible => 29,
            DeviceError::NotSupported => 99,
            DeviceError::Other(code) => *code,
        }
    }

    /// Errors that no amount of open retries can fix.
    pub fn is_fatal_to_open(&self) -> bool {
        matches!(
            self,
            DeviceError::InvalidSvoFile
                | DeviceError::InvalidResolution
                | DeviceError::InvalidFunctionParameters
                | DeviceError::InvalidAreaFile
                | DeviceError::ModuleNotCompatible
                | DeviceError::NotSupported
        )
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, DeviceError::CameraNotDetected)
    }
}
