//! Tracking origin bookkeeping shared by the simulated drivers.

use contracts::Pose;

/// Maps raw trajectory poses into the frame established by the last
/// tracking enable/reset: `origin ∘ anchor⁻¹ ∘ raw`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TrackingOrigin {
    origin: Pose,
    anchor_inv: Pose,
}

impl TrackingOrigin {
    /// `origin` becomes the reported pose at the raw pose `anchor`.
    pub(crate) fn new(origin: Pose, anchor: &Pose) -> Self {
        Self {
            origin,
            anchor_inv: anchor.inverse(),
        }
    }

    pub(crate) fn rebase(&self, raw: &Pose) -> Pose {
        self.origin.compose(&self.anchor_inv.compose(raw))
    }
}

/// Deterministic walk used by the mock: forward drift with a slow yaw.
pub(crate) fn synthetic_pose(index: u64) -> Pose {
    let i = index as f32;
    let half_yaw = 0.0005 * i;
    Pose::new(
        [0.01 * i, 0.0, 0.002 * i],
        [0.0, half_yaw.sin(), 0.0, half_yaw.cos()],
    )
}
