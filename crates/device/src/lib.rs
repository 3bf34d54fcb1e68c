//! # Device
//!
//! Depth-camera drivers that need no hardware.
//!
//! Responsibilities:
//! - Simulated camera with failure injection (`MockBackend`, `MockCamera`)
//! - Recorded-session playback (`ReplayBackend`, `ReplayCamera`)
//! - Recording directory format (`Recording`, `RecordingManifest`, `FrameRecord`)
//!
//! Hardware drivers implement the same `contracts::CameraBackend` /
//! `contracts::DepthCamera` traits and live outside this workspace.

pub mod error;
pub mod mock_backend;
pub mod mock_camera;
pub mod replay_camera;
mod trajectory;

pub use contracts::{CameraBackend, DepthCamera};
pub use error::{RecordingError, Result};
pub use mock_backend::{MockBackend, MockBackendConfig};
pub use mock_camera::{MockCamera, MockCameraConfig, MockControl, FAIL_FOREVER, MOCK_SERIAL};
pub use replay_camera::{FrameRecord, Recording, RecordingManifest, ReplayBackend, ReplayCamera};
