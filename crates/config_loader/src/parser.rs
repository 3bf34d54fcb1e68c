//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON 格式。

use contracts::{ContractError, SessionConfig};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn parse_toml(content: &str) -> Result<SessionConfig, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse_json(content: &str) -> Result<SessionConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse(content: &str, format: ConfigFormat) -> Result<SessionConfig, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::InputSource;

    #[test]
    fn parses_network_stream_json() {
        let content = r#"{
            "camera_id": "remote",
            "input": { "type": "network_stream", "ip": "192.168.1.20" },
            "tracking": { "enabled": false }
        }"#;
        let config = parse_json(content).unwrap();
        assert_eq!(
            config.input,
            InputSource::NetworkStream {
                ip: "192.168.1.20".into(),
                port: 30000
            }
        );
        assert!(!config.tracking.enabled);
    }

    #[test]
    fn missing_input_is_a_parse_error() {
        let err = parse_toml(r#"camera_id = "cam0""#).unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn unknown_input_type_is_rejected() {
        let content = r#"
camera_id = "cam0"
[input]
type = "usb_webcam"
"#;
        assert!(parse_toml(content).is_err());
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
