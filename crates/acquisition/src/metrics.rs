//! Acquisition metrics

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::CameraId;
use observability::GrabStatus;

/// Per-session acquisition counters
///
/// Counters are kept locally for telemetry snapshots and mirrored to the
/// Prometheus recorder.
#[derive(Debug)]
pub struct AcquisitionMetrics {
    camera_id: CameraId,

    /// Successful grabs
    pub grabs_ok: AtomicU64,

    /// Grabs that failed with a transient error
    pub grab_errors: AtomicU64,

    /// Grabs that reported the device gone
    pub disconnects: AtomicU64,

    /// Grabs past the end of a recording
    pub end_of_recording: AtomicU64,

    /// Frames taken by the consumer
    pub frames_consumed: AtomicU64,

    /// Playback loop-wraps
    pub loop_wraps: AtomicU64,
}

impl AcquisitionMetrics {
    pub fn new(camera_id: CameraId) -> Self {
        Self {
            camera_id,
            grabs_ok: AtomicU64::new(0),
            grab_errors: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            end_of_recording: AtomicU64::new(0),
            frames_consumed: AtomicU64::new(0),
            loop_wraps: AtomicU64::new(0),
        }
    }

    pub fn record_grab(&self, status: GrabStatus) {
        let counter = match status {
            GrabStatus::Ok => &self.grabs_ok,
            GrabStatus::Error => &self.grab_errors,
            GrabStatus::Disconnected => &self.disconnects,
            GrabStatus::EndOfRecording => &self.end_of_recording,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        observability::record_grab(&self.camera_id, status);
    }

    pub fn record_consumed(&self) {
        self.frames_consumed.fetch_add(1, Ordering::Relaxed);
        observability::record_frame_consumed(&self.camera_id);
    }

    pub fn record_loop_wrap(&self) {
        self.loop_wraps.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            grabs_ok: self.grabs_ok.load(Ordering::Relaxed),
            grab_errors: self.grab_errors.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            end_of_recording: self.end_of_recording.load(Ordering::Relaxed),
            frames_consumed: self.frames_consumed.load(Ordering::Relaxed),
            loop_wraps: self.loop_wraps.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub grabs_ok: u64,
    pub grab_errors: u64,
    pub disconnects: u64,
    pub end_of_recording: u64,
    pub frames_consumed: u64,
    pub loop_wraps: u64,
}
