//! # Session
//!
//! Camera session orchestration on top of the acquisition and perception
//! crates.
//!
//! Responsibilities:
//! - Background initialization with polled progress (`InitializationSequencer`)
//! - Per-tick frame and detection handoff (`CameraSession::update`)
//! - Disconnect recovery and hardware reboot
//! - Observer lists per event kind (`SessionEvents`)
//! - Explicit per-camera registry (`SessionRegistry`)
//!
//! ## Usage Example
//!
//! ```ignore
//! use session::SessionRegistry;
//!
//! let mut registry = SessionRegistry::new(backend);
//! let session = registry.create(config)?;
//! session.events().on_frame_grabbed(|frame| println!("{}", frame.timestamp_ns));
//! session.begin()?;
//!
//! loop {
//!     registry.update_all();
//!     // render ...
//! }
//! ```

mod error;
mod events;
mod registry;
mod sequencer;
mod session;

// Re-exports
pub use error::{FailureCode, FailureKind, Result, SessionError};
pub use events::{
    Disconnected, Observers, SessionEvents, SessionReady, StateChange, SubscriptionId,
};
pub use registry::SessionRegistry;
pub use sequencer::{InitHandle, InitializationProgress, InitializationSequencer, OpenedSession};
pub use session::{CameraSession, SessionState, SessionTelemetry};
