//! Rigid poses and their serializable form.
//!
//! All runtime math uses [`nalgebra::Isometry3<f64>`]. [`Pose`] is the plain
//! array representation used in configuration files and reports: a position
//! and a unit quaternion stored as `[x, y, z, w]`.

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};

/// Position + rotation in a parent frame.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pose {
    /// Translation `[x, y, z]`.
    #[serde(default = "zero_position")]
    pub position: [f64; 3],
    /// Rotation quaternion `[x, y, z, w]`. Normalized on conversion.
    #[serde(default = "identity_rotation")]
    pub rotation: [f64; 4],
}

fn zero_position() -> [f64; 3] {
    [0.0; 3]
}

fn identity_rotation() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl Pose {
    /// The identity pose.
    pub const IDENTITY: Self = Self {
        position: [0.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
    };

    /// Create from a position and an `[x, y, z, w]` quaternion.
    pub fn new(position: [f64; 3], rotation: [f64; 4]) -> Self {
        Self { position, rotation }
    }

    /// Pure translation.
    pub fn from_position(position: [f64; 3]) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Translation plus a rotation given as roll/pitch/yaw in radians.
    pub fn from_position_euler(position: [f64; 3], roll: f64, pitch: f64, yaw: f64) -> Self {
        let q = UnitQuaternion::from_euler_angles(roll, pitch, yaw);
        Self::from_isometry(&Isometry3::from_parts(Translation3::from(Vector3::from(position)), q))
    }

    /// `true` when all components are finite and the quaternion is not zero.
    pub fn is_valid(&self) -> bool {
        let finite = self.position.iter().chain(self.rotation.iter()).all(|v| v.is_finite());
        let norm_sq: f64 = self.rotation.iter().map(|v| v * v).sum();
        finite && norm_sq > 1e-12
    }

    /// Convert to an isometry, normalizing the quaternion.
    pub fn to_isometry(&self) -> Isometry3<f64> {
        let [x, y, z, w] = self.rotation;
        let rotation = UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z));
        Isometry3::from_parts(Translation3::from(Vector3::from(self.position)), rotation)
    }

    /// Convert from an isometry.
    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        let t = iso.translation.vector;
        let q = iso.rotation.coords;
        Self {
            position: [t.x, t.y, t.z],
            rotation: [q.x, q.y, q.z, q.w],
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<Isometry3<f64>> for Pose {
    fn from(iso: Isometry3<f64>) -> Self {
        Self::from_isometry(&iso)
    }
}

impl From<&Pose> for Isometry3<f64> {
    fn from(p: &Pose) -> Self {
        p.to_isometry()
    }
}
