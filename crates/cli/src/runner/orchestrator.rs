//! Session runner - drives one camera session from the CLI.
//!
//! Recorded session directories are replayed with `ReplayBackend`; every
//! other input runs against the simulated `MockBackend`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{CameraBackend, InputSource, SessionConfig};
use device::{MockBackend, ReplayBackend};
use observability::SessionMetricsAggregator;
use parking_lot::Mutex;
use session::{SessionRegistry, SessionState};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::RunStats;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub session: SessionConfig,

    /// Consumer tick period
    pub tick: Duration,

    /// Stop after this many consumed frames (None = unlimited)
    pub max_frames: Option<u64>,

    /// Run timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,

    /// Start pipelines once ready, on top of `start_on_ready`
    pub object_detection: bool,
    pub body_tracking: bool,
}

/// Pick the driver for a configuration.
pub fn select_backend(config: &SessionConfig) -> Arc<dyn CameraBackend> {
    match &config.input {
        InputSource::RecordedFile { path, .. } if path.is_dir() => {
            info!(path = %path.display(), "Replaying recorded session directory");
            Arc::new(ReplayBackend::new())
        }
        _ => {
            info!("Using simulated camera backend");
            Arc::new(MockBackend::new())
        }
    }
}

pub struct SessionRunner {
    config: RunnerConfig,
}

impl SessionRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Tick the session until a frame limit, timeout or fatal failure.
    pub async fn run(self) -> Result<RunStats> {
        let start_time = Instant::now();

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let backend = select_backend(&self.config.session);
        let camera_id = self.config.session.camera_id.clone();
        let aggregator = Arc::new(Mutex::new(SessionMetricsAggregator::new()));

        let mut registry = SessionRegistry::new(backend);
        let session = registry
            .create(self.config.session.clone())
            .context("Failed to register session")?;
        subscribe(session.events(), &aggregator);
        session.begin().context("Failed to begin session")?;

        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut pipelines_requested = false;

        let telemetry = loop {
            ticker.tick().await;
            registry.update_all();

            let session = registry
                .get_mut(&camera_id)
                .context("Session disappeared from registry")?;

            match session.state() {
                SessionState::Ready if !pipelines_requested => {
                    pipelines_requested = true;
                    if self.config.object_detection
                        && !self.config.session.object_detection.start_on_ready
                    {
                        session
                            .start_object_detection()
                            .context("Failed to start object detection")?;
                    }
                    if self.config.body_tracking && !self.config.session.body_tracking.start_on_ready
                    {
                        session
                            .start_body_tracking()
                            .context("Failed to start body tracking")?;
                    }
                }
                SessionState::Opening => pipelines_requested = false,
                SessionState::Closed => {
                    let reason = session
                        .last_error()
                        .map_or("closed".to_string(), ToString::to_string);
                    anyhow::bail!("Session {} closed: {}", camera_id, reason);
                }
                _ => {}
            }

            let telemetry = session.telemetry();
            if self
                .config
                .max_frames
                .is_some_and(|max| telemetry.frames_consumed >= max)
            {
                info!(frames = telemetry.frames_consumed, "Reached max frames limit");
                break telemetry;
            }
            if self
                .config
                .timeout
                .is_some_and(|timeout| start_time.elapsed() >= timeout)
            {
                warn!("Session timeout reached");
                break telemetry;
            }
        };

        let information = registry
            .get(&camera_id)
            .and_then(|s| s.camera_information().cloned());
        registry.close_all();

        let metrics = aggregator.lock().summary();
        Ok(RunStats {
            camera_id: camera_id.to_string(),
            duration: start_time.elapsed(),
            information,
            telemetry,
            metrics,
        })
    }
}

/// Feed session events into the in-memory aggregator.
fn subscribe(events: &mut session::SessionEvents, aggregator: &Arc<Mutex<SessionMetricsAggregator>>) {
    events.on_session_ready(|ready| {
        info!(
            camera_id = %ready.camera_id,
            serial = ready.information.serial_number,
            model = ?ready.information.camera_model,
            init_ms = ready.init_duration.as_millis() as u64,
            "Session ready"
        );
    });

    let agg = Arc::clone(aggregator);
    events.on_frame_grabbed(move |frame| agg.lock().record_frame(frame.timestamp_ns));

    let agg = Arc::clone(aggregator);
    events.on_object_detection_frame(move |frame| {
        agg.lock().record_detection("object_detection", frame.fps)
    });

    let agg = Arc::clone(aggregator);
    events.on_body_tracking_frame(move |frame| {
        agg.lock().record_detection("body_tracking", frame.fps)
    });

    let agg = Arc::clone(aggregator);
    events.on_disconnected(move |event| {
        warn!(
            camera_id = %event.camera_id,
            will_reconnect = event.will_reconnect,
            "Camera disconnected"
        );
        agg.lock().record_disconnect();
    });
}
