//! # Config Loader
//!
//! Loads a camera session configuration.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate value ranges and cross-field rules
//! - Produce a `SessionConfig`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("session.toml")).unwrap();
//! println!("camera: {}", config.camera_id);
//! ```

mod parser;
mod validator;

pub use contracts::SessionConfig;
pub use parser::ConfigFormat;
pub use validator::{warnings, ConfigWarning};

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Format is picked from the file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<SessionConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<SessionConfig, ContractError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }

    /// Validate an already-built configuration.
    pub fn validate(config: &SessionConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    pub fn to_toml(config: &SessionConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    pub fn to_json(config: &SessionConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DepthMode, InputSource, OPEN_RETRY_FOREVER};
    use std::io::Write;

    const RECORDED_TOML: &str = r#"
camera_id = "lab_rig"
resolution = "hd1080"
open_timeout_sec = 5

[input]
type = "recorded_file"
path = "captures/hallway.svo2"
real_time = true

[depth]
mode = "neural"

[tracking]
floor_as_origin = true
area_memory_path = "maps/hallway.area"
enable_area_memory = true

[object_detection]
start_on_ready = true
model = "multi_class_box_accurate"
image_sync = false

[object_detection.confidence]
person = 40
"#;

    #[test]
    fn loads_recorded_session() {
        let config = ConfigLoader::load_from_str(RECORDED_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(config.camera_id, "lab_rig");
        assert_eq!(config.open_timeout_sec, 5);
        assert_eq!(config.depth.mode, DepthMode::Neural);
        assert!(config.input.loops());
        match &config.input {
            InputSource::RecordedFile { real_time, .. } => assert!(real_time),
            other => panic!("unexpected input {other:?}"),
        }
        assert_eq!(config.object_detection.confidence.person, 40);
        assert_eq!(config.object_detection.confidence.vehicle, 60);
        assert!(!config.object_detection.image_sync);
    }

    #[test]
    fn minimal_live_config_uses_defaults() {
        let content = r#"
camera_id = "cam0"
[input]
type = "live"
serial_number = 31234567
"#;
        let config = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap();
        assert_eq!(config.open_timeout_sec, OPEN_RETRY_FOREVER);
        assert_eq!(config.optimization.timeout_sec, 600);
        assert_eq!(config.recovery.reboot_discovery_timeout_sec, 30);
    }

    #[test]
    fn toml_and_json_round_trip() {
        let config = ConfigLoader::load_from_str(RECORDED_TOML, ConfigFormat::Toml).unwrap();

        let toml = ConfigLoader::to_toml(&config).unwrap();
        let from_toml = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(from_toml, config);

        let json = ConfigLoader::to_json(&config).unwrap();
        let from_json = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(from_json, config);
    }

    #[test]
    fn validation_runs_after_parse() {
        let content = r#"
camera_id = "cam0"
open_timeout_sec = -5
[input]
type = "live"
"#;
        let err = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("open_timeout_sec"), "got: {err}");
    }

    #[test]
    fn load_from_path_detects_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(RECORDED_TOML.as_bytes()).unwrap();

        let config = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(config.camera_id, "lab_rig");

        let yaml = dir.path().join("session.yaml");
        std::fs::write(&yaml, "camera_id: cam0").unwrap();
        let err = ConfigLoader::load_from_path(&yaml).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }
}
