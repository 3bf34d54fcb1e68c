//! `devices` command implementation.

use anyhow::{Context, Result};
use contracts::CameraBackend;
use device::MockBackend;
use tracing::info;

use crate::cli::DevicesArgs;

/// Execute the `devices` command
pub fn run_devices(args: &DevicesArgs) -> Result<()> {
    let backend = MockBackend::new();
    let devices = backend.device_list();
    info!(backend = backend.name(), count = devices.len(), "Device discovery");

    if args.json {
        let json =
            serde_json::to_string_pretty(&devices).context("Failed to serialize device list")?;
        println!("{}", json);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No cameras found ({} backend)", backend.name());
        return Ok(());
    }

    println!("Cameras ({} backend):", backend.name());
    for device in &devices {
        println!(
            "  [{}] {:?} serial {} ({:?})",
            device.id, device.camera_model, device.serial_number, device.state
        );
    }
    Ok(())
}
