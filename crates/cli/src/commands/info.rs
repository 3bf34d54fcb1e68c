//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{InputSource, SessionConfig};

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo<'a> {
    camera_id: &'a str,
    input_kind: String,
    effective_fps: u32,
    frame_size: Option<(u32, u32)>,
    loops: bool,
    required_models: Vec<String>,
    config: &'a SessionConfig,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&config);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config);
    }

    Ok(())
}

fn build_config_info(config: &SessionConfig) -> ConfigInfo<'_> {
    ConfigInfo {
        camera_id: config.camera_id.as_str(),
        input_kind: format!("{:?}", config.input.kind()),
        effective_fps: config.effective_fps(),
        frame_size: config.resolution.dimensions(),
        loops: config.input.loops(),
        required_models: config
            .required_models()
            .iter()
            .map(ToString::to_string)
            .collect(),
        config,
    }
}

fn print_config_info(config: &SessionConfig) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Depth Session Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📷 Camera {}", config.camera_id);
    println!("   ├─ Version: {:?}", config.version);
    match &config.input {
        InputSource::Live {
            serial_number,
            device_id,
        } => println!(
            "   ├─ Input: live (serial {}, device {})",
            serial_number.map_or("any".to_string(), |s| s.to_string()),
            device_id.map_or("any".to_string(), |d| d.to_string())
        ),
        InputSource::RecordedFile {
            path,
            loop_playback,
            real_time,
        } => println!(
            "   ├─ Input: {} (loop {}, real-time {})",
            path.display(),
            loop_playback,
            real_time
        ),
        InputSource::NetworkStream { ip, port } => {
            println!("   ├─ Input: stream {}:{}", ip, port)
        }
    }
    println!(
        "   ├─ Resolution: {:?} @ {} fps",
        config.resolution,
        config.effective_fps()
    );
    println!(
        "   ├─ Depth: {:?} ({}m - {}m)",
        config.depth.mode, config.depth.minimum_distance_m, config.depth.maximum_distance_m
    );
    match config.open_timeout_sec {
        contracts::OPEN_RETRY_FOREVER => println!("   └─ Open timeout: retry forever"),
        0 => println!("   └─ Open timeout: single attempt"),
        secs => println!("   └─ Open timeout: {}s", secs),
    }

    let tracking = &config.tracking;
    println!("\n🧭 Tracking");
    println!("   ├─ Enabled: {}", tracking.enabled);
    println!("   ├─ Static: {}", tracking.set_as_static);
    println!(
        "   ├─ Area memory: {}",
        tracking
            .area_memory_path
            .as_ref()
            .filter(|_| tracking.enable_area_memory)
            .map_or("off".to_string(), |p| p.display().to_string())
    );
    println!(
        "   └─ Initial pose: {:?} / {:?}",
        tracking.initial_position, tracking.initial_rotation
    );

    let od = &config.object_detection;
    let bt = &config.body_tracking;
    println!("\n🔍 Perception");
    println!(
        "   ├─ Objects: {:?} (on ready {}, image sync {}, tracking {})",
        od.model, od.start_on_ready, od.image_sync, od.enable_tracking
    );
    println!(
        "   └─ Bodies: {:?}/{:?} (on ready {}, image sync {}, tracking {})",
        bt.model, bt.format, bt.start_on_ready, bt.image_sync, bt.enable_tracking
    );

    let models = config.required_models();
    if !models.is_empty() {
        println!("\n⚙️  Models to optimize ({})", models.len());
        for (i, model) in models.iter().enumerate() {
            let prefix = if i == models.len() - 1 { "└─" } else { "├─" };
            println!("   {} {}", prefix, model);
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_info_includes_derived_fields() {
        let mut config = SessionConfig::live("front");
        config.object_detection.start_on_ready = true;
        let info = build_config_info(&config);
        let json = serde_json::to_value(&info).unwrap();

        assert_eq!(json["camera_id"], "front");
        assert_eq!(json["input_kind"], "Live");
        assert_eq!(json["loops"], false);
        assert_eq!(json["required_models"].as_array().unwrap().len(), 1);
        assert_eq!(json["config"]["camera_id"], "front");
    }
}
