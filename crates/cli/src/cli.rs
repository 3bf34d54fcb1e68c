//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// depth-session - stereo depth camera session runner
#[derive(Parser, Debug)]
#[command(
    name = "depth-session",
    author,
    version,
    about = "Stereo depth camera session runner",
    long_about = "Opens a depth camera session from a configuration file, drives its \n\
                  per-tick update loop, and reports frame, tracking and detection \n\
                  telemetry. Recorded session directories are replayed; everything \n\
                  else runs against the simulated backend."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "DEPTH_SESSION_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "DEPTH_SESSION_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a camera session
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),

    /// List cameras visible to the simulated backend
    Devices(DevicesArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "session.toml",
        env = "DEPTH_SESSION_CONFIG"
    )]
    pub config: PathBuf,

    /// Consumer ticks per second
    #[arg(long, default_value = "60", env = "DEPTH_SESSION_TICK_HZ")]
    pub tick_hz: u32,

    /// Stop after this many consumed frames (0 = unlimited)
    #[arg(long, default_value = "0", env = "DEPTH_SESSION_MAX_FRAMES")]
    pub max_frames: u64,

    /// Run timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "DEPTH_SESSION_TIMEOUT")]
    pub timeout: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "DEPTH_SESSION_METRICS_PORT")]
    pub metrics_port: u16,

    /// Start object detection once the session is ready
    #[arg(long)]
    pub object_detection: bool,

    /// Start body tracking once the session is ready
    #[arg(long)]
    pub body_tracking: bool,

    /// Validate configuration and exit without opening the camera
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "session.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "session.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `devices` command
#[derive(Parser, Debug)]
pub struct DevicesArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults() {
        let cli = Cli::try_parse_from(["depth-session", "run"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.tick_hz, 60);
        assert_eq!(args.max_frames, 0);
        assert!(!args.object_detection);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["depth-session", "-q", "-v", "devices"]).is_err());
    }
}
