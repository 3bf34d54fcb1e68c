//! # Acquisition
//!
//! Background grab loop and the consumer-side handoff for one camera session.
//!
//! Responsibilities:
//! - Coarse-locked shared state (`SharedAcquisition`, `SharedState`)
//! - Grab loop on a named thread (`AcquisitionLoop`)
//! - Freshest-wins handoff to the consumer (`FrameHandoff`)
//! - Positional tracking state machine (`TrackingStateMachine`)
//! - Recorded-input cursor, seek, pause and loop-wrap (`PlaybackCursor`)
//!
//! ## Usage Example
//!
//! ```ignore
//! use acquisition::{AcquisitionLoop, FrameHandoff, SharedAcquisition};
//!
//! let shared = Arc::new(SharedAcquisition::new(config.camera_id.clone(), &config.input));
//! let handle = AcquisitionLoop::new(shared.clone(), camera.clone(), runtime).spawn()?;
//! shared.set_ready(true);
//!
//! let handoff = FrameHandoff::new(shared, camera);
//! // once per consumer tick
//! if let Some(frame) = handoff.take(|state, camera| state.grab_timestamp_ns) {
//!     // ...
//! }
//! ```

mod error;
mod grab_loop;
mod handoff;
mod metrics;
mod playback;
mod shared;
mod tracking;

// Re-exports
pub use error::{AcquisitionError, Result, TrackingError};
pub use grab_loop::{AcquisitionHandle, AcquisitionLoop, LoopStep};
pub use handoff::{FrameHandoff, Handoff};
pub use metrics::{AcquisitionMetrics, MetricsSnapshot};
pub use playback::PlaybackCursor;
pub use shared::{SharedAcquisition, SharedState};
pub use tracking::{TrackingMode, TrackingStateMachine};
