//! Detection frame broker
//!
//! One broker per pipeline. The `request_frame` / `frame_ready` flag pair
//! keeps at most one retrieved-but-unconsumed batch; `retrieve` refuses to
//! overwrite it and `consume` re-arms the request.

use std::sync::Arc;

use contracts::DepthCamera;
use tracing::{debug, trace};

use crate::pipeline::{DetectionBatch, DetectionSummary, Pipeline};

/// EMA weight of the previous FPS estimate
const FPS_SMOOTHING: f32 = 0.9;

/// A published detection batch.
#[derive(Debug)]
pub struct DetectionFrame<B> {
    /// Raw batch as returned by the driver
    pub raw: Arc<B>,
    pub summary: DetectionSummary,
    /// Smoothed detection rate at publication time
    pub fps: f32,
    /// 1-based publication counter since activation
    pub sequence: u64,
}

impl<B> Clone for DetectionFrame<B> {
    fn clone(&self) -> Self {
        Self {
            raw: Arc::clone(&self.raw),
            summary: self.summary.clone(),
            fps: self.fps,
            sequence: self.sequence,
        }
    }
}

impl<B: DetectionBatch> DetectionFrame<B> {
    pub fn timestamp_ns(&self) -> u64 {
        self.raw.timestamp_ns()
    }
}

/// Per-pipeline request/ready broker
#[derive(Debug)]
pub struct DetectionBroker<P: Pipeline> {
    params: Option<P::Params>,
    runtime: P::Runtime,
    request_frame: bool,
    frame_ready: bool,
    pending: Option<P::Batch>,
    published: Option<Arc<P::Batch>>,
    last_timestamp_ns: Option<u64>,
    fps: f32,
    sequence: u64,
    masks_released: u64,
}

impl<P: Pipeline> Default for DetectionBroker<P> {
    fn default() -> Self {
        Self::new(P::Runtime::default())
    }
}

impl<P: Pipeline> DetectionBroker<P> {
    pub fn new(runtime: P::Runtime) -> Self {
        Self {
            params: None,
            runtime,
            request_frame: false,
            frame_ready: false,
            pending: None,
            published: None,
            last_timestamp_ns: None,
            fps: 0.0,
            sequence: 0,
            masks_released: 0,
        }
    }

    /// Mark the pipeline as running once the driver has enabled it.
    pub fn activate(&mut self, params: P::Params) {
        debug!(pipeline = P::NAME, ?params, "detection broker activated");
        self.params = Some(params);
        self.request_frame = true;
        self.frame_ready = false;
        self.pending = None;
        self.last_timestamp_ns = None;
        self.fps = 0.0;
        self.sequence = 0;
    }

    pub fn deactivate(&mut self) {
        if self.params.take().is_some() {
            debug!(
                pipeline = P::NAME,
                published = self.sequence,
                "detection broker deactivated"
            );
        }
        self.request_frame = false;
        self.frame_ready = false;
        self.pending = None;
        self.published = None;
        self.fps = 0.0;
    }

    pub fn is_running(&self) -> bool {
        self.params.is_some()
    }

    pub fn params(&self) -> Option<&P::Params> {
        self.params.as_ref()
    }

    /// Retrieval happens inside the grab loop rather than on the consumer tick.
    pub fn image_sync(&self) -> bool {
        self.params.as_ref().is_some_and(P::image_sync)
    }

    pub fn runtime(&self) -> &P::Runtime {
        &self.runtime
    }

    pub fn set_runtime(&mut self, runtime: P::Runtime) {
        self.runtime = runtime;
    }

    pub fn request_frame(&self) -> bool {
        self.request_frame
    }

    pub fn frame_ready(&self) -> bool {
        self.frame_ready
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn frames_published(&self) -> u64 {
        self.sequence
    }

    pub fn masks_released(&self) -> u64 {
        self.masks_released
    }

    /// Most recently published batch.
    pub fn published(&self) -> Option<&Arc<P::Batch>> {
        self.published.as_ref()
    }

    /// Pull a result from the driver if one is requested.
    ///
    /// Returns `true` when a fresh batch was stored. A second call before
    /// `consume` is a no-op.
    pub fn retrieve(&mut self, camera: &dyn DepthCamera) -> bool {
        if !self.is_running() || !self.request_frame {
            return false;
        }
        match P::retrieve(camera, &self.runtime) {
            Ok(batch) if batch.is_new() => {
                trace!(
                    pipeline = P::NAME,
                    timestamp_ns = batch.timestamp_ns(),
                    entities = batch.len(),
                    "detection batch retrieved"
                );
                self.pending = Some(batch);
                self.request_frame = false;
                self.frame_ready = true;
                true
            }
            Ok(_) => false,
            Err(e) => {
                trace!(pipeline = P::NAME, error = %e, "detection retrieve failed");
                false
            }
        }
    }

    /// Publish the ready batch, if any, and re-arm the request flag.
    pub fn consume(&mut self) -> Option<DetectionFrame<P::Batch>> {
        if !self.frame_ready {
            return None;
        }
        self.frame_ready = false;
        self.request_frame = true;
        let batch = self.pending.take()?;

        let timestamp_ns = batch.timestamp_ns();
        if let Some(prev) = self.last_timestamp_ns {
            if timestamp_ns > prev {
                let instant = 1e9 / (timestamp_ns - prev) as f32;
                self.fps = if self.fps > 0.0 {
                    FPS_SMOOTHING * self.fps + (1.0 - FPS_SMOOTHING) * instant
                } else {
                    instant
                };
            }
        }
        self.last_timestamp_ns = Some(timestamp_ns);

        // Masks of the previous frame go; listeners still holding it keep theirs.
        if let Some(mut previous) = self.published.take() {
            if let Some(prev_batch) = Arc::get_mut(&mut previous) {
                self.masks_released += prev_batch.release_masks() as u64;
            }
        }

        let summary = batch.summarize();
        let raw = Arc::new(batch);
        self.published = Some(Arc::clone(&raw));
        self.sequence += 1;

        Some(DetectionFrame {
            raw,
            summary,
            fps: self.fps,
            sequence: self.sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{BodyTracking, ObjectDetection};
    use contracts::{
        BodyTrackingParameters, DepthCamera, ObjectDetectionParameters, RuntimeParameters,
        SessionConfig,
    };
    use device::{MockCamera, MockCameraConfig, MockControl};

    fn open_camera() -> MockCamera {
        let camera = MockCamera::new(MockCameraConfig::default(), MockControl::new());
        camera
            .open(&SessionConfig::live("broker").to_init_parameters())
            .unwrap();
        camera
    }

    fn segmented() -> ObjectDetectionParameters {
        ObjectDetectionParameters {
            image_sync: true,
            enable_segmentation: true,
            ..Default::default()
        }
    }

    #[test]
    fn inactive_broker_never_retrieves() {
        let camera = open_camera();
        let mut broker = DetectionBroker::<ObjectDetection>::default();
        camera.grab(&RuntimeParameters::default()).unwrap();
        assert!(!broker.retrieve(&camera));
        assert!(broker.consume().is_none());
    }

    #[test]
    fn second_retrieve_before_consume_is_noop() {
        let camera = open_camera();
        camera.enable_object_detection(&segmented()).unwrap();
        let mut broker = DetectionBroker::<ObjectDetection>::default();
        broker.activate(segmented());

        camera.grab(&RuntimeParameters::default()).unwrap();
        assert!(broker.retrieve(&camera));
        let first_ts = camera.image_timestamp_ns();

        camera.grab(&RuntimeParameters::default()).unwrap();
        assert!(!broker.retrieve(&camera));
        assert!(broker.frame_ready());

        let frame = broker.consume().unwrap();
        assert_eq!(frame.timestamp_ns(), first_ts);
        assert_eq!(frame.sequence, 1);
        assert!(broker.request_frame());
    }

    #[test]
    fn stale_batch_is_not_stored() {
        let camera = open_camera();
        let params = BodyTrackingParameters::default();
        camera.enable_body_tracking(&params).unwrap();
        let mut broker = DetectionBroker::<BodyTracking>::default();
        broker.activate(params);

        camera.grab(&RuntimeParameters::default()).unwrap();
        assert!(broker.retrieve(&camera));
        broker.consume().unwrap();

        // Same grab, already retrieved: the driver clears its fresh marker.
        assert!(!broker.retrieve(&camera));
        assert!(broker.consume().is_none());
    }

    #[test]
    fn consume_frees_previous_masks_not_current() {
        let camera = open_camera();
        camera.enable_object_detection(&segmented()).unwrap();
        let mut broker = DetectionBroker::<ObjectDetection>::default();
        broker.activate(segmented());

        camera.grab(&RuntimeParameters::default()).unwrap();
        broker.retrieve(&camera);
        let first = broker.consume().unwrap();
        assert!(first.raw.objects.iter().all(|o| o.mask.is_some()));
        drop(first);

        camera.grab(&RuntimeParameters::default()).unwrap();
        broker.retrieve(&camera);
        let second = broker.consume().unwrap();
        assert!(second.raw.objects.iter().all(|o| o.mask.is_some()));
        assert_eq!(broker.masks_released(), 2);
    }

    #[test]
    fn fps_follows_timestamp_deltas() {
        let camera = open_camera();
        camera.enable_object_detection(&segmented()).unwrap();
        let mut broker = DetectionBroker::<ObjectDetection>::default();
        broker.activate(segmented());

        for _ in 0..5 {
            camera.grab(&RuntimeParameters::default()).unwrap();
            broker.retrieve(&camera);
            broker.consume();
        }
        assert!(broker.fps() > 0.0);

        broker.deactivate();
        assert_eq!(broker.fps(), 0.0);
        assert!(!broker.is_running());
    }
}
