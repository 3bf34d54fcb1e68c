//! Camera pose and positional-tracking types

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Rigid camera pose: position in meters plus orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub translation: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Build from a position and an `[x, y, z, w]` quaternion (normalized here).
    pub fn new(position: [f32; 3], rotation_xyzw: [f32; 4]) -> Self {
        let [x, y, z, w] = rotation_xyzw;
        Self {
            translation: Vector3::new(position[0], position[1], position[2]),
            rotation: UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z)),
        }
    }

    pub fn from_isometry(iso: &Isometry3<f32>) -> Self {
        Self {
            translation: iso.translation.vector,
            rotation: iso.rotation,
        }
    }

    pub fn to_isometry(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.translation), self.rotation)
    }

    /// `self ∘ other`: apply `other` expressed in the frame of `self`.
    pub fn compose(&self, other: &Pose) -> Pose {
        Pose::from_isometry(&(self.to_isometry() * other.to_isometry()))
    }

    pub fn inverse(&self) -> Pose {
        Pose::from_isometry(&self.to_isometry().inverse())
    }

    /// Position and rotation agree within `eps` (meters / radians).
    pub fn approx_eq(&self, other: &Pose, eps: f32) -> bool {
        (self.translation - other.translation).norm() <= eps
            && self.rotation.angle_to(&other.rotation) <= eps
    }
}

/// Tracking status reported by the driver alongside each pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionalTrackingState {
    #[default]
    Off,
    Searching,
    Ok,
    FpsTooLow,
}

/// Pose quality as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingQuality {
    #[default]
    Off,
    Searching,
    Ok,
}

impl From<PositionalTrackingState> for TrackingQuality {
    fn from(state: PositionalTrackingState) -> Self {
        match state {
            PositionalTrackingState::Off => TrackingQuality::Off,
            PositionalTrackingState::Ok => TrackingQuality::Ok,
            PositionalTrackingState::Searching | PositionalTrackingState::FpsTooLow => {
                TrackingQuality::Searching
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceFrame {
    #[default]
    World,
    Camera,
}

/// Parameters handed to the driver when positional tracking is enabled.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackingParameters {
    /// 跟踪原点
    pub initial_pose: Pose,
    pub enable_area_memory: bool,
    pub area_file_path: Option<PathBuf>,
    pub enable_pose_smoothing: bool,
    pub set_floor_as_origin: bool,
    pub set_gravity_as_origin: bool,
    pub enable_imu_fusion: bool,
    /// Camera is known not to move; the driver skips motion estimation.
    pub set_as_static: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_with_inverse_is_identity() {
        let pose = Pose::new([1.0, 2.0, 3.0], [0.0, 0.38268343, 0.0, 0.9238795]);
        let round = pose.compose(&pose.inverse());
        assert!(round.approx_eq(&Pose::identity(), 1e-5));
    }

    #[test]
    fn new_normalizes_rotation() {
        let pose = Pose::new([0.0; 3], [0.0, 0.0, 0.0, 2.0]);
        assert!(pose.rotation.angle_to(&UnitQuaternion::identity()) < 1e-6);
    }

    #[test]
    fn fps_too_low_reads_as_searching() {
        assert_eq!(
            TrackingQuality::from(PositionalTrackingState::FpsTooLow),
            TrackingQuality::Searching
        );
    }
}
