//! Device crate error types

use thiserror::Error;

/// Failure to load a recorded session directory.
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("recording io error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest: {message}")]
    Manifest { message: String },

    #[error("invalid frame record on line {line}: {message}")]
    Record { line: usize, message: String },

    #[error("recording at '{path}' has no frames")]
    Empty { path: String },
}

impl RecordingError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, RecordingError>;
