//! # Contracts
//!
//! Shared data structures and driver traits for depth-camera sessions.
//! Every other crate depends on this one; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Capture timestamps are driver nanoseconds (`u64`), monotonic per session
//! - Recorded inputs additionally expose a frame cursor (`svo_position`)

mod camera_id;
mod config;
mod detection;
mod device;
mod error;
mod frame;
mod pose;

pub use camera_id::CameraId;
pub use config::*;
pub use detection::*;
pub use device::*;
pub use error::*;
pub use frame::*;
pub use pose::*;
