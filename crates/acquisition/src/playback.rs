//! Recorded-input playback control
//!
//! Cursor bookkeeping, seek/pause, and loop-wrap. Loop-wrap is the only
//! place the shared pose is rewritten without an explicit user request.

use contracts::{DepthCamera, Pose};
use tracing::{debug, info};

use crate::shared::{SharedAcquisition, SharedState};

/// Playback position of a recorded input. Meaningless for live input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackCursor {
    /// Index of the last grabbed frame
    pub current: i32,
    pub total: i32,
    /// Pose of the first tracked frame, reapplied on every wrap
    pub wrap_origin: Option<Pose>,
    pub wraps: u64,
}

impl PlaybackCursor {
    pub fn new(total: i32) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// The cursor reached the wrap point two frames before the end.
    pub fn at_wrap_point(&self) -> bool {
        self.total > 0 && self.current >= self.total - 2
    }
}

impl SharedAcquisition {
    /// Seek a recorded input. While paused, one out-of-band grab is queued
    /// so the new position becomes visible.
    pub fn set_position(&self, camera: &dyn DepthCamera, frame: i32) {
        if !self.is_recorded() {
            return;
        }
        camera.set_svo_position(frame);
        let position = camera.svo_position();
        {
            let mut state = self.lock();
            state.playback.current = position;
        }
        self.clear_end_of_recording();
        if self.is_paused() {
            self.request_single_grab();
        }
        debug!(camera_id = %self.camera_id(), frame = position, "playback position set");
    }

    pub fn pause(&self) {
        self.set_paused(true);
    }

    pub fn resume(&self) {
        self.set_paused(false);
    }

    /// Loop back to frame 0 and re-seed tracking to the cached origin.
    pub(crate) fn wrap_playback(&self, state: &mut SharedState, camera: &dyn DepthCamera) {
        camera.set_svo_position(0);
        state.playback.current = 0;
        state.playback.wraps += 1;
        self.clear_end_of_recording();
        self.metrics().record_loop_wrap();

        if let Some(origin) = state.playback.wrap_origin {
            if state.tracking.is_active() && state.tracking.wrap_reset(camera, &origin) {
                state.pose = origin;
            }
        }

        info!(
            camera_id = %self.camera_id(),
            wraps = state.playback.wraps,
            tracking = ?state.tracking.mode(),
            "recording looped"
        );
    }

    /// Handle a recording that ran past its last frame.
    ///
    /// Looping inputs wrap; others keep the last frame. Returns whether a
    /// wrap happened.
    pub fn wrap_if_ended(&self, camera: &dyn DepthCamera) -> bool {
        if !self.loops() || !self.is_end_of_recording() {
            return false;
        }
        // The request flag stays set across end-of-file grabs, so the
        // grab thread resumes on its own.
        let mut state = self.lock();
        self.wrap_playback(&mut state, camera);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_point_is_two_before_end() {
        let mut cursor = PlaybackCursor::new(10);
        cursor.current = 7;
        assert!(!cursor.at_wrap_point());
        cursor.current = 8;
        assert!(cursor.at_wrap_point());
    }

    #[test]
    fn empty_recording_never_wraps() {
        assert!(!PlaybackCursor::default().at_wrap_point());
    }
}
