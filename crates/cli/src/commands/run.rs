//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use contracts::{InputSource, SessionConfig};

use crate::cli::RunArgs;
use crate::runner::{RunnerConfig, SessionRunner};

/// Execute the `run` command
pub async fn run_session(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let session = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        camera_id = %session.camera_id,
        input = ?session.input.kind(),
        resolution = ?session.resolution,
        fps = session.effective_fps(),
        tracking = session.tracking.enabled,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&session);
        return Ok(());
    }

    let runner_config = RunnerConfig {
        session,
        tick: Duration::from_secs_f64(1.0 / f64::from(args.tick_hz.max(1))),
        max_frames: (args.max_frames > 0).then_some(args.max_frames),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
        object_detection: args.object_detection,
        body_tracking: args.body_tracking,
    };

    let runner = SessionRunner::new(runner_config);
    let shutdown_signal = setup_shutdown_signal();

    info!("Starting session...");

    tokio::select! {
        result = runner.run() => {
            let stats = result.context("Session run failed")?;
            info!(
                frames = stats.telemetry.frames_consumed,
                duration_secs = stats.duration.as_secs_f64(),
                fps = format!("{:.2}", stats.fps()),
                "Session completed"
            );
            stats.print_summary();
        }
        _ = shutdown_signal => {
            warn!("Received shutdown signal, closing session...");
        }
    }

    info!("depth-session finished");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM. A handler that cannot be installed never
/// resolves.
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &SessionConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Camera: {}", config.camera_id);
    match &config.input {
        InputSource::Live {
            serial_number,
            device_id,
        } => println!(
            "  Input: live (serial {:?}, device {:?})",
            serial_number, device_id
        ),
        InputSource::RecordedFile {
            path,
            loop_playback,
            real_time,
        } => println!(
            "  Input: recording {} (loop {}, real-time {})",
            path.display(),
            loop_playback,
            real_time
        ),
        InputSource::NetworkStream { ip, port } => println!("  Input: stream {}:{}", ip, port),
    }
    println!(
        "  Resolution: {:?} @ {} fps",
        config.resolution,
        config.effective_fps()
    );
    println!("  Depth: {:?}", config.depth.mode);
    println!("  Tracking: {}", config.tracking.enabled);
    println!("  Open timeout: {}s", config.open_timeout_sec);

    let models = config.required_models();
    if !models.is_empty() {
        println!("\nModels to optimize before opening:");
        for model in models {
            println!("  - {}", model);
        }
    }

    println!();
}
