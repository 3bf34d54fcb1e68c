//! Run statistics.

use std::time::Duration;

use contracts::CameraInformation;
use observability::MetricsSummary;
use session::SessionTelemetry;

/// Statistics from a session run
#[derive(Debug, Clone)]
pub struct RunStats {
    pub camera_id: String,

    /// Wall-clock duration of the run
    pub duration: Duration,

    /// Identity reported by the camera, if it opened
    pub information: Option<CameraInformation>,

    /// Session counters at the end of the run
    pub telemetry: SessionTelemetry,

    /// Aggregated event statistics
    pub metrics: MetricsSummary,
}

impl RunStats {
    /// Consumed frames per wall-clock second
    pub fn fps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.telemetry.frames_consumed as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Share of grabbed frames the consumer never saw, in percent
    pub fn skip_rate(&self) -> f64 {
        let grabbed = self.telemetry.frames_grabbed;
        if grabbed > 0 {
            grabbed.saturating_sub(self.telemetry.frames_consumed) as f64 / grabbed as f64 * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Session Statistics                        ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Camera: {}", self.camera_id);
        if let Some(info) = &self.information {
            println!(
                "   ├─ Device: {:?} serial {} ({}x{} @ {} fps)",
                info.camera_model, info.serial_number, info.width, info.height, info.fps
            );
        }
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Frames consumed: {}", self.telemetry.frames_consumed);
        println!("   ├─ Frames grabbed: {}", self.telemetry.frames_grabbed);
        println!("   ├─ Skipped by consumer: {:.2}%", self.skip_rate());
        println!("   ├─ FPS: {:.2}", self.fps());
        println!("   ├─ Grab FPS: {:.2}", self.telemetry.grab_fps);
        println!("   └─ Consumer FPS: {:.2}", self.telemetry.consumer_fps);

        println!("\n🔁 Recovery & Playback");
        println!("   ├─ Disconnects: {}", self.telemetry.disconnects);
        println!("   ├─ Reconnects: {}", self.telemetry.reconnects);
        println!("   ├─ Loop wraps: {}", self.telemetry.loop_wraps);
        println!("   └─ Tracking resets: {}", self.telemetry.tracking_resets);

        println!("\n{}", self.metrics);
    }
}
