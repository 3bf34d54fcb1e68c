//! Positional tracking state machine
//!
//! `Off → Enabling → {Enabled, Failed}`; quality dips (`Searching`) are
//! tracked separately and never leave `Enabled`. Reset is only valid while
//! enabled. Every transition happens under the shared lock; a user reset
//! talks to the driver between two short lock sections.

use contracts::{DepthCamera, DeviceResult, Pose, PositionalTrackingState, TrackingQuality};
use tracing::{debug, info, warn};

use crate::error::TrackingError;
use crate::shared::SharedAcquisition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingMode {
    #[default]
    Off,
    Enabling,
    Enabled,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct TrackingStateMachine {
    mode: TrackingMode,
    quality: TrackingQuality,
    static_mode: bool,
    resets: u64,
}

impl TrackingStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    pub fn quality(&self) -> TrackingQuality {
        self.quality
    }

    /// Enabled with a static (non-moving) camera.
    pub fn is_static(&self) -> bool {
        self.static_mode
    }

    /// Poses should be fetched on every grab.
    pub fn is_active(&self) -> bool {
        self.mode == TrackingMode::Enabled
    }

    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn begin_enable(&mut self) -> Result<(), TrackingError> {
        match self.mode {
            TrackingMode::Off | TrackingMode::Failed => {
                self.mode = TrackingMode::Enabling;
                Ok(())
            }
            mode => Err(TrackingError::AlreadyEnabled { mode }),
        }
    }

    /// Record the driver's answer to `enable_tracking`.
    pub fn complete_enable(
        &mut self,
        result: DeviceResult<()>,
        static_mode: bool,
    ) -> Result<(), TrackingError> {
        match result {
            Ok(()) => {
                self.mode = TrackingMode::Enabled;
                self.quality = TrackingQuality::Searching;
                self.static_mode = static_mode;
                info!(static_mode, "positional tracking enabled");
                Ok(())
            }
            Err(source) => {
                self.mode = TrackingMode::Failed;
                self.quality = TrackingQuality::Off;
                warn!(error = %source, "positional tracking failed to enable");
                Err(TrackingError::EnableFailed { source })
            }
        }
    }

    /// Feed the status reported alongside a pose.
    pub fn observe(&mut self, state: PositionalTrackingState) {
        if self.mode != TrackingMode::Enabled {
            return;
        }
        let quality = TrackingQuality::from(state);
        if quality != self.quality {
            debug!(from = ?self.quality, to = ?quality, "tracking quality changed");
            self.quality = quality;
        }
    }

    pub fn disable(&mut self) {
        if self.mode != TrackingMode::Off {
            info!(from = ?self.mode, "positional tracking disabled");
        }
        self.mode = TrackingMode::Off;
        self.quality = TrackingQuality::Off;
        self.static_mode = false;
    }

    pub fn on_disconnect(&mut self) {
        self.mode = TrackingMode::Off;
        self.quality = TrackingQuality::Off;
    }

    /// Reset is only valid while enabled.
    pub fn ensure_resettable(&self) -> Result<(), TrackingError> {
        if self.mode != TrackingMode::Enabled {
            return Err(TrackingError::NotEnabled { mode: self.mode });
        }
        Ok(())
    }

    /// Count a reset the driver has accepted.
    pub fn record_reset(&mut self) {
        self.resets += 1;
        debug!(resets = self.resets, "tracking origin reset");
    }

    /// Re-seed the tracking origin.
    pub fn reset(&mut self, camera: &dyn DepthCamera, pose: &Pose) -> Result<(), TrackingError> {
        self.ensure_resettable()?;
        camera
            .reset_tracking(pose)
            .map_err(|source| TrackingError::ResetFailed { source })?;
        self.record_reset();
        Ok(())
    }

    /// Reset on playback loop-wrap. Failure turns tracking off for the rest
    /// of playback instead of aborting.
    pub fn wrap_reset(&mut self, camera: &dyn DepthCamera, pose: &Pose) -> bool {
        match self.reset(camera, pose) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "tracking reset on loop-wrap failed, continuing without tracking");
                camera.disable_tracking(None);
                self.disable();
                false
            }
        }
    }
}

impl SharedAcquisition {
    /// User-requested re-seed. The driver call runs without the shared lock;
    /// state is checked before and updated after.
    pub fn reset_tracking(&self, camera: &dyn DepthCamera, pose: &Pose) -> Result<(), TrackingError> {
        self.lock().tracking.ensure_resettable()?;
        camera
            .reset_tracking(pose)
            .map_err(|source| TrackingError::ResetFailed { source })?;

        let mut state = self.lock();
        state.tracking.record_reset();
        state.pose = *pose;
        Ok(())
    }
}
