//! Perception results and pipeline parameters
//!
//! Object detection and body tracking share the same batch shape: a
//! timestamp, a fresh-result marker and a list of entities.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Person,
    Vehicle,
    Bag,
    Animal,
    Electronics,
    FruitVegetable,
    Sport,
}

impl ObjectClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectClass::Person => "person",
            ObjectClass::Vehicle => "vehicle",
            ObjectClass::Bag => "bag",
            ObjectClass::Animal => "animal",
            ObjectClass::Electronics => "electronics",
            ObjectClass::FruitVegetable => "fruit_vegetable",
            ObjectClass::Sport => "sport",
        }
    }
}

/// Per-entity tracking status inside one detection batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityTrackingState {
    #[default]
    Off,
    Ok,
    Searching,
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectData {
    pub id: i32,
    pub label: ObjectClass,
    /// 0..=100
    pub confidence: f32,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub dimensions: [f32; 3],
    /// Image-space corners, clockwise from top-left.
    pub bounding_box_2d: [[u32; 2]; 4],
    pub tracking_state: EntityTrackingState,
    /// Segmentation mask; only present when segmentation is enabled.
    #[serde(default)]
    pub mask: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectsBatch {
    pub timestamp_ns: u64,
    /// Driver marks a batch new once per produced result.
    pub is_new: bool,
    pub is_tracked: bool,
    pub objects: Vec<ObjectData>,
}

/// Skeleton layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyFormat {
    Body18,
    #[default]
    Body34,
    Body38,
}

impl BodyFormat {
    pub fn keypoint_count(&self) -> usize {
        match self {
            BodyFormat::Body18 => 18,
            BodyFormat::Body34 => 34,
            BodyFormat::Body38 => 38,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyData {
    pub id: i32,
    pub confidence: f32,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub keypoints: Vec<[f32; 3]>,
    pub keypoint_confidence: Vec<f32>,
    pub tracking_state: EntityTrackingState,
    #[serde(default)]
    pub mask: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BodiesBatch {
    pub timestamp_ns: u64,
    pub is_new: bool,
    pub is_tracked: bool,
    pub bodies: Vec<BodyData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelAccuracy {
    #[default]
    Fast,
    Medium,
    Accurate,
}

/// Inference models that need an optimized engine before first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiModel {
    NeuralDepth,
    MultiClassDetection(ModelAccuracy),
    PersonHeadDetection(ModelAccuracy),
    HumanBody {
        accuracy: ModelAccuracy,
        format: BodyFormat,
    },
}

impl std::fmt::Display for AiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiModel::NeuralDepth => write!(f, "neural_depth"),
            AiModel::MultiClassDetection(acc) => write!(f, "multi_class_{acc:?}"),
            AiModel::PersonHeadDetection(acc) => write!(f, "person_head_{acc:?}"),
            AiModel::HumanBody { accuracy, format } => {
                write!(f, "human_body_{accuracy:?}_{format:?}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelStatus {
    pub downloaded: bool,
    pub optimized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectDetectionModel {
    #[default]
    MultiClassBoxFast,
    MultiClassBoxMedium,
    MultiClassBoxAccurate,
    PersonHeadBoxFast,
    PersonHeadBoxAccurate,
    /// Externally supplied boxes; nothing to optimize.
    CustomBoxObjects,
}

impl ObjectDetectionModel {
    pub fn ai_model(&self) -> Option<AiModel> {
        match self {
            ObjectDetectionModel::MultiClassBoxFast => {
                Some(AiModel::MultiClassDetection(ModelAccuracy::Fast))
            }
            ObjectDetectionModel::MultiClassBoxMedium => {
                Some(AiModel::MultiClassDetection(ModelAccuracy::Medium))
            }
            ObjectDetectionModel::MultiClassBoxAccurate => {
                Some(AiModel::MultiClassDetection(ModelAccuracy::Accurate))
            }
            ObjectDetectionModel::PersonHeadBoxFast => {
                Some(AiModel::PersonHeadDetection(ModelAccuracy::Fast))
            }
            ObjectDetectionModel::PersonHeadBoxAccurate => {
                Some(AiModel::PersonHeadDetection(ModelAccuracy::Accurate))
            }
            ObjectDetectionModel::CustomBoxObjects => None,
        }
    }
}

/// Confidence threshold per object class, 1..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassConfidence {
    pub person: u8,
    pub vehicle: u8,
    pub bag: u8,
    pub animal: u8,
    pub electronics: u8,
    pub fruit_vegetable: u8,
    pub sport: u8,
}

impl Default for ClassConfidence {
    fn default() -> Self {
        Self {
            person: 60,
            vehicle: 60,
            bag: 60,
            animal: 60,
            electronics: 60,
            fruit_vegetable: 60,
            sport: 60,
        }
    }
}

impl ClassConfidence {
    pub fn threshold(&self, class: ObjectClass) -> u8 {
        match class {
            ObjectClass::Person => self.person,
            ObjectClass::Vehicle => self.vehicle,
            ObjectClass::Bag => self.bag,
            ObjectClass::Animal => self.animal,
            ObjectClass::Electronics => self.electronics,
            ObjectClass::FruitVegetable => self.fruit_vegetable,
            ObjectClass::Sport => self.sport,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectClass, u8)> + '_ {
        [
            ObjectClass::Person,
            ObjectClass::Vehicle,
            ObjectClass::Bag,
            ObjectClass::Animal,
            ObjectClass::Electronics,
            ObjectClass::FruitVegetable,
            ObjectClass::Sport,
        ]
        .into_iter()
        .map(move |class| (class, self.threshold(class)))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectDetectionParameters {
    pub model: ObjectDetectionModel,
    pub image_sync: bool,
    pub enable_tracking: bool,
    pub enable_segmentation: bool,
    pub max_range_m: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectDetectionRuntime {
    pub confidence: ClassConfidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyTrackingModel {
    #[default]
    HumanBodyFast,
    HumanBodyMedium,
    HumanBodyAccurate,
}

impl BodyTrackingModel {
    pub fn accuracy(&self) -> ModelAccuracy {
        match self {
            BodyTrackingModel::HumanBodyFast => ModelAccuracy::Fast,
            BodyTrackingModel::HumanBodyMedium => ModelAccuracy::Medium,
            BodyTrackingModel::HumanBodyAccurate => ModelAccuracy::Accurate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BodyTrackingParameters {
    pub model: BodyTrackingModel,
    pub format: BodyFormat,
    pub image_sync: bool,
    pub enable_tracking: bool,
    pub enable_body_fitting: bool,
    pub enable_segmentation: bool,
    pub max_range_m: f32,
}

impl BodyTrackingParameters {
    pub fn ai_model(&self) -> AiModel {
        AiModel::HumanBody {
            accuracy: self.model.accuracy(),
            format: self.format,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BodyTrackingRuntime {
    pub confidence_threshold: u8,
    pub minimum_keypoints_threshold: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_boxes_need_no_model() {
        assert_eq!(ObjectDetectionModel::CustomBoxObjects.ai_model(), None);
        assert_eq!(
            ObjectDetectionModel::PersonHeadBoxAccurate.ai_model(),
            Some(AiModel::PersonHeadDetection(ModelAccuracy::Accurate))
        );
    }

    #[test]
    fn class_confidence_iterates_every_class() {
        let mut confidence = ClassConfidence::default();
        confidence.vehicle = 35;
        let all: Vec<_> = confidence.iter().collect();
        assert_eq!(all.len(), 7);
        assert!(all.contains(&(ObjectClass::Vehicle, 35)));
    }

    #[test]
    fn object_mask_is_optional_in_json() {
        let json = r#"{
            "id": 3, "label": "person", "confidence": 88.0,
            "position": [0.0, 0.0, 2.0], "velocity": [0.0, 0.0, 0.0],
            "dimensions": [0.5, 1.8, 0.3],
            "bounding_box_2d": [[0,0],[10,0],[10,20],[0,20]],
            "tracking_state": "ok"
        }"#;
        let object: ObjectData = serde_json::from_str(json).unwrap();
        assert_eq!(object.label, ObjectClass::Person);
        assert!(object.mask.is_none());
    }
}
