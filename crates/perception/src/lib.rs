//! # Perception
//!
//! 感知管线（目标检测、人体跟踪）的帧同步与启动逻辑。
//!
//! 负责：
//! - `DetectionBroker`: request/ready 标志对，最多一帧未消费
//! - `ModelOptimizer`: AI 模型优化的轮询/超时等待
//! - `PipelineStarter`: 异步启动，防止重复启动，优化期间强制暂停回放
//!
//! ## 使用示例
//!
//! ```ignore
//! use perception::{DetectionBroker, ObjectDetection};
//!
//! let mut broker = DetectionBroker::<ObjectDetection>::new(runtime);
//! broker.activate(params);
//!
//! // 抓帧线程 (image sync)
//! broker.retrieve(camera.as_ref());
//!
//! // 消费者线程
//! if let Some(frame) = broker.consume() {
//!     println!("{} objects, {:.1} fps", frame.summary.entity_count, frame.fps);
//! }
//! ```

mod broker;
mod error;
mod optimizer;
mod pipeline;
mod starter;

pub use broker::{DetectionBroker, DetectionFrame};
pub use error::{PerceptionError, Result};
pub use optimizer::{ModelOptimizer, OptimizationOutcome};
pub use pipeline::{BodyTracking, DetectionBatch, DetectionSummary, ObjectDetection, Pipeline};
pub use starter::{PipelineStarter, PlaybackGate};
