//! 配置校验模块
//!
//! 校验规则：
//! - camera_id 非空
//! - open_timeout_sec >= -1
//! - fps <= 120
//! - 输入源字段齐全 (录像路径、网络地址)
//! - 深度距离范围合法
//! - 每类置信度阈值在 1..=100
//! - 模型优化超时与轮询间隔 > 0
//! - 空间记忆文件扩展名为 .area

use std::fmt;
use std::path::Path;

use contracts::{ContractError, InputSource, SessionConfig, OPEN_RETRY_FOREVER};

/// 校验 SessionConfig
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &SessionConfig) -> Result<(), ContractError> {
    validate_camera_id(config)?;
    validate_open_timeout(config)?;
    validate_fps(config)?;
    validate_input(config)?;
    validate_depth(config)?;
    validate_tracking(config)?;
    validate_object_detection(config)?;
    validate_body_tracking(config)?;
    validate_optimization(config)?;
    validate_recovery(config)?;
    Ok(())
}

fn validate_camera_id(config: &SessionConfig) -> Result<(), ContractError> {
    if config.camera_id.trim().is_empty() {
        return Err(ContractError::config_validation(
            "camera_id",
            "camera_id cannot be empty",
        ));
    }
    Ok(())
}

fn validate_open_timeout(config: &SessionConfig) -> Result<(), ContractError> {
    if config.open_timeout_sec < OPEN_RETRY_FOREVER {
        return Err(ContractError::config_validation(
            "open_timeout_sec",
            format!(
                "must be -1 (retry forever), 0 (single attempt) or positive, got {}",
                config.open_timeout_sec
            ),
        ));
    }
    Ok(())
}

fn validate_fps(config: &SessionConfig) -> Result<(), ContractError> {
    if config.fps > 120 {
        return Err(ContractError::config_validation(
            "fps",
            format!("fps must be <= 120, got {}", config.fps),
        ));
    }
    Ok(())
}

fn validate_input(config: &SessionConfig) -> Result<(), ContractError> {
    match &config.input {
        InputSource::Live { .. } => Ok(()),
        InputSource::RecordedFile { path, .. } => {
            if path.as_os_str().is_empty() {
                return Err(ContractError::config_validation(
                    "input.path",
                    "recorded file path cannot be empty",
                ));
            }
            Ok(())
        }
        InputSource::NetworkStream { ip, port } => {
            if ip.trim().is_empty() {
                return Err(ContractError::config_validation(
                    "input.ip",
                    "stream ip cannot be empty",
                ));
            }
            if *port == 0 {
                return Err(ContractError::config_validation(
                    "input.port",
                    "stream port must be > 0",
                ));
            }
            Ok(())
        }
    }
}

fn validate_depth(config: &SessionConfig) -> Result<(), ContractError> {
    let depth = &config.depth;
    if depth.minimum_distance_m < 0.0 {
        return Err(ContractError::config_validation(
            "depth.minimum_distance_m",
            format!("must be >= 0, got {}", depth.minimum_distance_m),
        ));
    }
    if depth.minimum_distance_m >= depth.maximum_distance_m {
        return Err(ContractError::config_validation(
            "depth.minimum_distance_m / depth.maximum_distance_m",
            format!(
                "minimum_distance_m ({}) must be < maximum_distance_m ({})",
                depth.minimum_distance_m, depth.maximum_distance_m
            ),
        ));
    }
    Ok(())
}

fn validate_tracking(config: &SessionConfig) -> Result<(), ContractError> {
    if let Some(path) = &config.tracking.area_memory_path {
        if !has_extension(path, "area") {
            return Err(ContractError::config_validation(
                "tracking.area_memory_path",
                format!("spatial memory file must end in .area, got {}", path.display()),
            ));
        }
    }
    Ok(())
}

fn validate_object_detection(config: &SessionConfig) -> Result<(), ContractError> {
    let od = &config.object_detection;
    for (class, threshold) in od.confidence.iter() {
        check_confidence(
            &format!("object_detection.confidence.{}", class.as_str()),
            threshold,
        )?;
    }
    check_range("object_detection.max_range_m", od.max_range_m)
}

fn validate_body_tracking(config: &SessionConfig) -> Result<(), ContractError> {
    let bt = &config.body_tracking;
    check_confidence("body_tracking.confidence_threshold", bt.confidence_threshold)?;
    check_range("body_tracking.max_range_m", bt.max_range_m)?;

    let keypoints = bt.format.keypoint_count();
    if bt.minimum_keypoints_threshold as usize > keypoints {
        return Err(ContractError::config_validation(
            "body_tracking.minimum_keypoints_threshold",
            format!(
                "{:?} has {} keypoints, threshold {} can never be met",
                bt.format, keypoints, bt.minimum_keypoints_threshold
            ),
        ));
    }
    Ok(())
}

fn validate_optimization(config: &SessionConfig) -> Result<(), ContractError> {
    let opt = &config.optimization;
    if opt.timeout_sec == 0 {
        return Err(ContractError::config_validation(
            "optimization.timeout_sec",
            "timeout_sec must be > 0",
        ));
    }
    if opt.poll_interval_ms == 0 {
        return Err(ContractError::config_validation(
            "optimization.poll_interval_ms",
            "poll_interval_ms must be > 0",
        ));
    }
    Ok(())
}

fn validate_recovery(config: &SessionConfig) -> Result<(), ContractError> {
    if config.recovery.reboot_poll_interval_ms == 0 {
        return Err(ContractError::config_validation(
            "recovery.reboot_poll_interval_ms",
            "reboot_poll_interval_ms must be > 0",
        ));
    }
    Ok(())
}

fn check_confidence(field: &str, value: u8) -> Result<(), ContractError> {
    if !(1..=100).contains(&value) {
        return Err(ContractError::config_validation(
            field,
            format!("confidence must be in 1..=100, got {value}"),
        ));
    }
    Ok(())
}

fn check_range(field: &str, value: f32) -> Result<(), ContractError> {
    if value < 0.0 {
        return Err(ContractError::config_validation(
            field,
            format!("range must be >= 0, got {value}"),
        ));
    }
    Ok(())
}

fn has_extension(path: &Path, expected: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(expected))
}

/// Legal but probably unintended settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// 非致命的配置提示
pub fn warnings(config: &SessionConfig) -> Vec<ConfigWarning> {
    let mut out = Vec::new();
    let tracking_off = !config.tracking.enabled;

    if tracking_off && config.object_detection.enable_tracking {
        out.push(ConfigWarning {
            field: "object_detection.enable_tracking",
            message: "object tracking needs positional tracking; the driver enables it implicitly"
                .into(),
        });
    }
    if tracking_off && config.body_tracking.enable_tracking {
        out.push(ConfigWarning {
            field: "body_tracking.enable_tracking",
            message: "body tracking needs positional tracking; the driver enables it implicitly"
                .into(),
        });
    }
    if config.tracking.area_memory_path.is_some() && !config.tracking.enable_area_memory {
        out.push(ConfigWarning {
            field: "tracking.area_memory_path",
            message: "area file is set but enable_area_memory is false; it will be ignored"
                .into(),
        });
    }
    if config.open_timeout_sec == OPEN_RETRY_FOREVER
        && matches!(config.input, InputSource::RecordedFile { .. })
    {
        out.push(ConfigWarning {
            field: "open_timeout_sec",
            message: "retrying forever on a recorded file only helps if the file appears later"
                .into(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::BodyFormat;

    fn minimal_config() -> SessionConfig {
        SessionConfig::live("cam0")
    }

    #[test]
    fn valid_config() {
        assert!(validate(&minimal_config()).is_ok());
    }

    #[test]
    fn empty_camera_id() {
        let mut config = minimal_config();
        config.camera_id = "  ".into();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("camera_id cannot be empty"), "got: {err}");
    }

    #[test]
    fn open_timeout_sentinels() {
        let mut config = minimal_config();
        for ok in [-1, 0, 30] {
            config.open_timeout_sec = ok;
            assert!(validate(&config).is_ok(), "{ok} should be accepted");
        }
        config.open_timeout_sec = -2;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn recorded_path_required() {
        let mut config = minimal_config();
        config.input = InputSource::RecordedFile {
            path: "".into(),
            loop_playback: true,
            real_time: false,
        };
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("input.path"), "got: {err}");
    }

    #[test]
    fn stream_port_zero() {
        let mut config = minimal_config();
        config.input = InputSource::NetworkStream {
            ip: "10.0.0.2".into(),
            port: 0,
        };
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("port"), "got: {err}");
    }

    #[test]
    fn inverted_depth_range() {
        let mut config = minimal_config();
        config.depth.minimum_distance_m = 5.0;
        config.depth.maximum_distance_m = 1.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn confidence_out_of_range() {
        let mut config = minimal_config();
        config.object_detection.confidence.animal = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("confidence.animal"), "got: {err}");

        let mut config = minimal_config();
        config.body_tracking.confidence_threshold = 101;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn area_file_extension() {
        let mut config = minimal_config();
        config.tracking.area_memory_path = Some("maps/room.bin".into());
        assert!(validate(&config).is_err());
        config.tracking.area_memory_path = Some("maps/room.AREA".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn keypoint_threshold_above_format() {
        let mut config = minimal_config();
        config.body_tracking.format = BodyFormat::Body18;
        config.body_tracking.minimum_keypoints_threshold = 20;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("never be met"), "got: {err}");
    }

    #[test]
    fn zero_optimization_timeout() {
        let mut config = minimal_config();
        config.optimization.timeout_sec = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn warns_on_detection_tracking_without_positional_tracking() {
        let mut config = minimal_config();
        config.tracking.enabled = false;
        let found = warnings(&config);
        assert!(found
            .iter()
            .any(|w| w.field == "object_detection.enable_tracking"));
        assert!(warnings(&minimal_config()).is_empty());
    }
}
