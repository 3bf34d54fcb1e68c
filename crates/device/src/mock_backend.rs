//! Mock 相机后端
//!
//! `CameraBackend` 的 mock 实现：创建 `MockCamera`，模拟设备列表、
//! 硬件重启与模型优化，支持注入失败场景。

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use contracts::{
    AiModel, CameraBackend, DepthCamera, DeviceError, DeviceProperties, DeviceResult,
    DeviceState, InputSource, ModelStatus,
};
use parking_lot::Mutex;
use tracing::{info, instrument};

use crate::mock_camera::{MockCamera, MockCameraConfig, MockControl, FAIL_FOREVER};

/// Mock 后端配置
#[derive(Debug, Clone, Default)]
pub struct MockBackendConfig {
    pub camera: MockCameraConfig,
    /// 已优化的模型
    pub optimized_models: Vec<AiModel>,
    /// 模型优化耗时
    pub optimization_time: Duration,
    /// 模型优化失败
    pub fail_optimization: bool,
    /// 重启后设备在列表中消失的轮询次数；`FAIL_FOREVER` 表示永不恢复
    pub reboot_hidden_polls: u32,
}

/// Mock camera backend
pub struct MockBackend {
    config: MockBackendConfig,
    control: Arc<MockControl>,
    optimized: Mutex<HashSet<AiModel>>,
    hidden_polls: AtomicU32,
    reboots: AtomicU32,
    optimize_calls: AtomicU32,
    cameras_created: AtomicU32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_config(MockBackendConfig::default())
    }

    pub fn with_config(config: MockBackendConfig) -> Self {
        let optimized = config.optimized_models.iter().copied().collect();
        Self {
            config,
            control: MockControl::new(),
            optimized: Mutex::new(optimized),
            hidden_polls: AtomicU32::new(0),
            reboots: AtomicU32::new(0),
            optimize_calls: AtomicU32::new(0),
            cameras_created: AtomicU32::new(0),
        }
    }

    /// Fault injection shared with every camera this backend creates.
    pub fn control(&self) -> Arc<MockControl> {
        self.control.clone()
    }

    pub fn reboots(&self) -> u32 {
        self.reboots.load(Ordering::SeqCst)
    }

    pub fn optimize_calls(&self) -> u32 {
        self.optimize_calls.load(Ordering::SeqCst)
    }

    pub fn cameras_created(&self) -> u32 {
        self.cameras_created.load(Ordering::SeqCst)
    }

    fn device_hidden(&self) -> bool {
        self.hidden_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                FAIL_FOREVER => Some(n),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn create_camera(&self, _input: &InputSource) -> Arc<dyn DepthCamera> {
        self.cameras_created.fetch_add(1, Ordering::SeqCst);
        Arc::new(MockCamera::new(
            self.config.camera.clone(),
            self.control.clone(),
        ))
    }

    fn device_list(&self) -> Vec<DeviceProperties> {
        if self.device_hidden() || self.control.is_disconnected() {
            return Vec::new();
        }
        vec![DeviceProperties {
            id: 0,
            serial_number: self.config.camera.serial_number,
            camera_model: self.config.camera.camera_model,
            state: DeviceState::Available,
        }]
    }

    #[instrument(name = "mock_backend_reboot", skip(self))]
    fn reboot(&self, serial: u32) -> DeviceResult<()> {
        if serial != self.config.camera.serial_number {
            return Err(DeviceError::CameraNotDetected);
        }
        self.reboots.fetch_add(1, Ordering::SeqCst);
        self.hidden_polls
            .store(self.config.reboot_hidden_polls, Ordering::SeqCst);
        // A power cycle clears a simulated unplug.
        self.control.reconnect();
        info!(serial, "mock device rebooting");
        Ok(())
    }

    fn model_status(&self, model: AiModel) -> ModelStatus {
        let optimized = self.optimized.lock().contains(&model);
        ModelStatus {
            downloaded: optimized,
            optimized,
        }
    }

    #[instrument(name = "mock_backend_optimize", skip(self), fields(model = %model))]
    fn optimize_model(&self, model: AiModel) -> DeviceResult<()> {
        self.optimize_calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.config.optimization_time);
        if self.config.fail_optimization {
            return Err(DeviceError::Failure);
        }
        self.optimized.lock().insert(model);
        Ok(())
    }
}
