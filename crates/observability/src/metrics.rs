//! 相机会话指标收集模块
//!
//! Prometheus 指标 (通过 `metrics` 宏) 以及内存中的会话统计聚合。
//! 所有指标都带 `camera_id` 标签。

use std::collections::BTreeMap;

use contracts::CameraId;
use metrics::{counter, gauge, histogram};

/// Outcome of one acquisition-loop grab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabStatus {
    Ok,
    Disconnected,
    EndOfRecording,
    Error,
}

impl GrabStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrabStatus::Ok => "ok",
            GrabStatus::Disconnected => "disconnected",
            GrabStatus::EndOfRecording => "end_of_recording",
            GrabStatus::Error => "error",
        }
    }
}

/// 记录一次 grab 结果
pub fn record_grab(camera_id: &CameraId, status: GrabStatus) {
    counter!(
        "depth_session_grabs_total",
        "camera_id" => camera_id.to_string(),
        "status" => status.as_str()
    )
    .increment(1);
}

/// 记录消费者取走一帧
pub fn record_frame_consumed(camera_id: &CameraId) {
    counter!("depth_session_frames_consumed_total", "camera_id" => camera_id.to_string())
        .increment(1);
}

/// 记录感知管线发布的一帧
pub fn record_detection_frame(camera_id: &CameraId, pipeline: &'static str) {
    counter!(
        "depth_session_detection_frames_total",
        "camera_id" => camera_id.to_string(),
        "pipeline" => pipeline
    )
    .increment(1);
}

pub fn record_disconnect(camera_id: &CameraId) {
    counter!("depth_session_disconnects_total", "camera_id" => camera_id.to_string())
        .increment(1);
}

/// 跟踪状态编码: 0 = off, 1 = searching, 2 = ok
pub fn record_tracking_status(camera_id: &CameraId, status: u8) {
    gauge!("depth_session_tracking_status", "camera_id" => camera_id.to_string())
        .set(f64::from(status));
}

/// 初始化耗时 (从 begin 到 Ready)
pub fn record_init_duration(camera_id: &CameraId, seconds: f64) {
    histogram!("depth_session_init_duration_seconds", "camera_id" => camera_id.to_string())
        .record(seconds);
}

pub fn record_grab_fps(camera_id: &CameraId, fps: f64) {
    gauge!("depth_session_grab_fps", "camera_id" => camera_id.to_string()).set(fps);
}

/// 会话指标聚合器
///
/// 在内存中聚合指标，供 CLI 输出摘要。
#[derive(Debug, Clone, Default)]
pub struct SessionMetricsAggregator {
    /// 消费帧数
    pub total_frames: u64,

    /// 断线次数
    pub disconnects: u64,

    /// 相邻消费帧的捕获时间间隔 (毫秒)
    pub frame_interval_stats: RunningStats,

    /// 各管线检测帧率
    pub detection_fps: BTreeMap<String, RunningStats>,

    /// 各管线检测帧数
    pub detection_frames: BTreeMap<String, u64>,

    last_timestamp_ns: Option<u64>,
}

impl SessionMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录消费的一帧
    pub fn record_frame(&mut self, timestamp_ns: u64) {
        self.total_frames += 1;
        if let Some(prev) = self.last_timestamp_ns {
            if timestamp_ns > prev {
                self.frame_interval_stats
                    .push((timestamp_ns - prev) as f64 / 1_000_000.0);
            }
        }
        self.last_timestamp_ns = Some(timestamp_ns);
    }

    /// 记录一帧检测结果及其平滑帧率
    pub fn record_detection(&mut self, pipeline: &str, fps: f32) {
        *self.detection_frames.entry(pipeline.to_string()).or_insert(0) += 1;
        if fps > 0.0 {
            self.detection_fps
                .entry(pipeline.to_string())
                .or_default()
                .push(f64::from(fps));
        }
    }

    pub fn record_disconnect(&mut self) {
        self.disconnects += 1;
        // Frame intervals across a reconnect are meaningless.
        self.last_timestamp_ns = None;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let mean_interval = self.frame_interval_stats.mean();
        MetricsSummary {
            total_frames: self.total_frames,
            disconnects: self.disconnects,
            consumer_fps: if mean_interval > 0.0 {
                1000.0 / mean_interval
            } else {
                0.0
            },
            frame_interval_ms: StatsSummary::from(&self.frame_interval_stats),
            detection_frames: self.detection_frames.clone(),
            detection_fps: self
                .detection_fps
                .iter()
                .map(|(k, v)| (k.clone(), StatsSummary::from(v)))
                .collect(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub disconnects: u64,
    pub consumer_fps: f64,
    pub frame_interval_ms: StatsSummary,
    pub detection_frames: BTreeMap<String, u64>,
    pub detection_fps: BTreeMap<String, StatsSummary>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Session Metrics Summary ===")?;
        writeln!(f, "Frames consumed: {}", self.total_frames)?;
        writeln!(f, "Consumer FPS: {:.2}", self.consumer_fps)?;
        writeln!(f, "Frame interval (ms): {}", self.frame_interval_ms)?;
        writeln!(f, "Disconnects: {}", self.disconnects)?;

        if !self.detection_frames.is_empty() {
            writeln!(f, "Detection pipelines:")?;
            for (pipeline, count) in &self.detection_frames {
                let fps = self
                    .detection_fps
                    .get(pipeline)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "N/A".to_string());
                writeln!(f, "  {}: {} frames, fps {}", pipeline, count, fps)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();

        stats.push(1.0);
        stats.push(2.0);
        stats.push(3.0);
        stats.push(4.0);
        stats.push(5.0);

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_frame_intervals() {
        let mut aggregator = SessionMetricsAggregator::new();

        aggregator.record_frame(0);
        aggregator.record_frame(20_000_000);
        aggregator.record_frame(40_000_000);

        let summary = aggregator.summary();
        assert_eq!(summary.total_frames, 3);
        assert_eq!(summary.frame_interval_ms.count, 2);
        assert!((summary.consumer_fps - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_disconnect_breaks_interval_chain() {
        let mut aggregator = SessionMetricsAggregator::new();

        aggregator.record_frame(1_000);
        aggregator.record_disconnect();
        aggregator.record_frame(9_000_000_000);

        assert_eq!(aggregator.disconnects, 1);
        assert_eq!(aggregator.frame_interval_stats.count(), 0);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = SessionMetricsAggregator::new();
        aggregator.record_frame(0);
        aggregator.record_frame(10_000_000);
        aggregator.record_detection("object_detection", 15.0);
        aggregator.record_detection("object_detection", 0.0);

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Frames consumed: 2"));
        assert!(output.contains("object_detection: 2 frames"));
    }
}
