//! Anchor frame resolution.
//!
//! Content hangs off a tracked target as `target → root → wrapper → anchor`.
//! With the root at identity under the target, the anchor lands exactly on
//! the target when the wrapper's local pose is the inverse of the anchor's
//! local pose.

use nalgebra::{Isometry3, Translation3};

/// Wrapper-local pose that places `anchor_local` on the parent's origin.
///
/// `position = R⁻¹ · (−t)`, `rotation = R⁻¹` where `(R, t)` is the anchor's
/// pose relative to the wrapper.
pub fn resolve_placement(anchor_local: &Isometry3<f64>) -> Isometry3<f64> {
    let inverse_rotation = anchor_local.rotation.inverse();
    let position = inverse_rotation * (-anchor_local.translation.vector);
    Isometry3::from_parts(Translation3::from(position), inverse_rotation)
}
