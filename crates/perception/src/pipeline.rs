//! Pipeline kinds
//!
//! Object detection and body tracking share the broker and starter logic;
//! `Pipeline` supplies the driver calls and types that differ between them.

use std::collections::BTreeMap;

use contracts::{
    AiModel, BodiesBatch, BodyTrackingParameters, BodyTrackingRuntime, DepthCamera,
    DeviceResult, EntityTrackingState, ObjectDetectionParameters, ObjectDetectionRuntime,
    ObjectsBatch,
};

/// Compact view of one detection batch for listeners that do not need the raw data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetectionSummary {
    pub timestamp_ns: u64,
    pub entity_count: usize,
    /// Entities whose tracking state is `Ok`
    pub tracked_count: usize,
    pub labels: BTreeMap<&'static str, usize>,
}

/// One timestamped batch of perception results.
pub trait DetectionBatch: std::fmt::Debug + Send + Sync + 'static {
    fn timestamp_ns(&self) -> u64;

    /// Fresh marker set by the driver for results not yet retrieved.
    fn is_new(&self) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop per-entity segmentation masks, returning how many were freed.
    fn release_masks(&mut self) -> usize;

    fn summarize(&self) -> DetectionSummary;
}

impl DetectionBatch for ObjectsBatch {
    fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    fn is_new(&self) -> bool {
        self.is_new
    }

    fn len(&self) -> usize {
        self.objects.len()
    }

    fn release_masks(&mut self) -> usize {
        self.objects
            .iter_mut()
            .filter_map(|o| o.mask.take())
            .count()
    }

    fn summarize(&self) -> DetectionSummary {
        let mut labels = BTreeMap::new();
        for object in &self.objects {
            *labels.entry(object.label.as_str()).or_insert(0) += 1;
        }
        DetectionSummary {
            timestamp_ns: self.timestamp_ns,
            entity_count: self.objects.len(),
            tracked_count: self
                .objects
                .iter()
                .filter(|o| o.tracking_state == EntityTrackingState::Ok)
                .count(),
            labels,
        }
    }
}

impl DetectionBatch for BodiesBatch {
    fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    fn is_new(&self) -> bool {
        self.is_new
    }

    fn len(&self) -> usize {
        self.bodies.len()
    }

    fn release_masks(&mut self) -> usize {
        self.bodies.iter_mut().filter_map(|b| b.mask.take()).count()
    }

    fn summarize(&self) -> DetectionSummary {
        let mut labels = BTreeMap::new();
        if !self.bodies.is_empty() {
            labels.insert("person", self.bodies.len());
        }
        DetectionSummary {
            timestamp_ns: self.timestamp_ns,
            entity_count: self.bodies.len(),
            tracked_count: self
                .bodies
                .iter()
                .filter(|b| b.tracking_state == EntityTrackingState::Ok)
                .count(),
            labels,
        }
    }
}

/// A perception pipeline kind.
pub trait Pipeline: Send + Sync + 'static {
    /// Name used in logs, metrics and thread names.
    const NAME: &'static str;

    type Batch: DetectionBatch;
    type Params: Clone + std::fmt::Debug + Send + Sync + 'static;
    type Runtime: Clone + std::fmt::Debug + Default + Send + Sync + 'static;

    /// Model that must be optimized before enabling, if any.
    fn model(params: &Self::Params) -> Option<AiModel>;

    /// Retrieve inside the grab loop's locked section.
    fn image_sync(params: &Self::Params) -> bool;

    fn enable(camera: &dyn DepthCamera, params: &Self::Params) -> DeviceResult<()>;

    fn disable(camera: &dyn DepthCamera);

    fn retrieve(camera: &dyn DepthCamera, runtime: &Self::Runtime) -> DeviceResult<Self::Batch>;
}

/// 目标检测
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectDetection;

impl Pipeline for ObjectDetection {
    const NAME: &'static str = "object_detection";

    type Batch = ObjectsBatch;
    type Params = ObjectDetectionParameters;
    type Runtime = ObjectDetectionRuntime;

    fn model(params: &Self::Params) -> Option<AiModel> {
        params.model.ai_model()
    }

    fn image_sync(params: &Self::Params) -> bool {
        params.image_sync
    }

    fn enable(camera: &dyn DepthCamera, params: &Self::Params) -> DeviceResult<()> {
        camera.enable_object_detection(params)
    }

    fn disable(camera: &dyn DepthCamera) {
        camera.disable_object_detection();
    }

    fn retrieve(camera: &dyn DepthCamera, runtime: &Self::Runtime) -> DeviceResult<Self::Batch> {
        camera.retrieve_objects(runtime)
    }
}

/// 人体骨架跟踪
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyTracking;

impl Pipeline for BodyTracking {
    const NAME: &'static str = "body_tracking";

    type Batch = BodiesBatch;
    type Params = BodyTrackingParameters;
    type Runtime = BodyTrackingRuntime;

    fn model(params: &Self::Params) -> Option<AiModel> {
        Some(params.ai_model())
    }

    fn image_sync(params: &Self::Params) -> bool {
        params.image_sync
    }

    fn enable(camera: &dyn DepthCamera, params: &Self::Params) -> DeviceResult<()> {
        camera.enable_body_tracking(params)
    }

    fn disable(camera: &dyn DepthCamera) {
        camera.disable_body_tracking();
    }

    fn retrieve(camera: &dyn DepthCamera, runtime: &Self::Runtime) -> DeviceResult<Self::Batch> {
        camera.retrieve_bodies(runtime)
    }
}
