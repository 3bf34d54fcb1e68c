//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    camera_id: String,
    input: String,
    tracking: bool,
    object_detection_on_ready: bool,
    body_tracking_on_ready: bool,
    models_to_optimize: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings: Vec<String> = config_loader::warnings(&config)
                .iter()
                .map(ToString::to_string)
                .collect();

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    camera_id: config.camera_id.to_string(),
                    input: format!("{:?}", config.input.kind()),
                    tracking: config.tracking.enabled,
                    object_detection_on_ready: config.object_detection.start_on_ready,
                    body_tracking_on_ready: config.body_tracking.start_on_ready,
                    models_to_optimize: config.required_models().len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Camera: {}", summary.camera_id);
            println!("  Input: {}", summary.input);
            println!("  Tracking: {}", summary.tracking);
            println!(
                "  Detection on ready: objects={} bodies={}",
                summary.object_detection_on_ready, summary.body_tracking_on_ready
            );
            println!("  Models to optimize: {}", summary.models_to_optimize);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn valid_config_reports_warnings() {
        let file = write_config(
            r#"
camera_id = "front"

[input]
type = "live"

[tracking]
enabled = false

[object_detection]
enable_tracking = true
"#,
        );
        let result = validate_config(&ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        });
        assert!(result.valid);
        assert!(result.warnings.is_some_and(|w| !w.is_empty()));
    }

    #[test]
    fn invalid_config_is_reported() {
        let file = write_config(
            r#"
camera_id = "front"
open_timeout_sec = -5

[input]
type = "live"
"#,
        );
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        };
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.is_some());
        assert!(run_validate(&args).is_err());
    }

    #[test]
    fn missing_file() {
        let result = validate_config(&ValidateArgs {
            config: "does/not/exist.toml".into(),
            json: false,
        });
        assert!(!result.valid);
    }
}
