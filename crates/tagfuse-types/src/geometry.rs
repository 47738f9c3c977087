//! Rigid-body geometry primitives.
//!
//! Field coordinates follow the blue-origin convention: X runs along the
//! field length away from the blue driver station, Y to the left, Z up.
//! Headings are measured counter-clockwise from +X in radians.
//!
//! Camera frames use the same axes as the robot frame (X forward, Y left,
//! Z up), so a camera-to-tag [`Transform3D`] can be composed directly with
//! field and robot transforms.
//!
//! # Example
//!
//! ```rust
//! use tagfuse_types::geometry::{Quaternion, Transform3D, Vec3};
//!
//! // Tag 1 m in front of the camera, facing back at it.
//! let camera_to_tag = Transform3D::new(
//!     Vec3::new(1.0, 0.0, 0.0),
//!     Quaternion::from_yaw(std::f64::consts::PI),
//! );
//! let tag_to_camera = camera_to_tag.inverse();
//! let round_trip = camera_to_tag.compose(tag_to_camera);
//! assert!(round_trip.translation.norm() < 1e-9);
//! ```

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Wrap an angle into `(-π, π]`.
pub fn normalize_angle(rad: f64) -> f64 {
    let wrapped = rad.rem_euclid(2.0 * PI);
    if wrapped > PI { wrapped - 2.0 * PI } else { wrapped }
}

// ────────────────────────────────────────────────────────────────────────────
// 3-D primitives
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D translation vector (metres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Drop the Z component.
    pub fn to_translation2d(self) -> Translation2D {
        Translation2D::new(self.x, self.y)
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1); see [`Quaternion::normalized`].
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `yaw` radians about +Z.
    pub fn from_yaw(yaw: f64) -> Self {
        let half = yaw * 0.5;
        Self::new(half.cos(), 0.0, 0.0, half.sin())
    }

    /// Extrinsic roll (X), then pitch (Y), then yaw (Z), all in radians.
    pub fn from_euler(roll: f64, pitch: f64, yaw: f64) -> Self {
        let (sr, cr) = (roll * 0.5).sin_cos();
        let (sp, cp) = (pitch * 0.5).sin_cos();
        let (sy, cy) = (yaw * 0.5).sin_cos();
        Self::new(
            cr * cp * cy + sr * sp * sy,
            sr * cp * cy - cr * sp * sy,
            cr * sp * cy + sr * cp * sy,
            cr * cp * sy - sr * sp * cy,
        )
    }

    /// Rescale to unit length.  A zero quaternion becomes the identity.
    pub fn normalized(self) -> Self {
        let n = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if n < f64::EPSILON {
            return Self::identity();
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// Heading about +Z, in `(-π, π]`.
    pub fn yaw(self) -> f64 {
        let siny_cosp = 2.0 * (self.w * self.z + self.x * self.y);
        let cosy_cosp = 1.0 - 2.0 * (self.y * self.y + self.z * self.z);
        siny_cosp.atan2(cosy_cosp)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: translation followed by rotation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, rotate it by `rotation` then add
/// `translation`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

/// A pose in field coordinates is the transform from the field origin.
pub type Pose3D = Transform3D;

impl Transform3D {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Compose two transforms: `self` applied first, then `other`.
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation);
        Self::new(translated, rotated)
    }

    /// If `self` = T_A_B, returns T_B_A.
    pub fn inverse(self) -> Self {
        let inv_rot = self.rotation.conjugate();
        Self::new(inv_rot.rotate(self.translation.neg()), inv_rot)
    }

    /// `false` if any translation or rotation component is NaN or infinite.
    pub fn is_finite(self) -> bool {
        let q = self.rotation;
        self.translation.is_finite()
            && q.w.is_finite()
            && q.x.is_finite()
            && q.y.is_finite()
            && q.z.is_finite()
    }

    /// Project onto the ground plane: keep X, Y and the yaw component.
    pub fn to_pose2d(self) -> Pose2D {
        Pose2D::new(self.translation.x, self.translation.y, self.rotation.yaw())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// 2-D primitives
// ────────────────────────────────────────────────────────────────────────────

/// A planar translation (metres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Translation2D {
    pub x: f64,
    pub y: f64,
}

impl Translation2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn norm(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A robot pose on the field: position plus heading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub heading_rad: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, heading_rad: f64) -> Self {
        Self { x, y, heading_rad }
    }

    pub fn translation(self) -> Translation2D {
        Translation2D::new(self.x, self.y)
    }

    /// Planar Euclidean distance between the two positions; heading is ignored.
    pub fn distance(self, other: Self) -> f64 {
        self.translation().distance(other.translation())
    }

    /// The candidate closest to `self`.
    ///
    /// Only a strictly smaller distance replaces the current best, so ties go
    /// to the candidate encountered first.  Returns `None` for an empty slice.
    pub fn nearest(self, candidates: &[Pose2D]) -> Option<Pose2D> {
        let mut best: Option<(Pose2D, f64)> = None;
        for candidate in candidates {
            let d = self.distance(*candidate);
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((*candidate, d)),
            }
        }
        best.map(|(pose, _)| pose)
    }

    /// `[x, y, heading]`, the layout used for number-array telemetry.
    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.heading_rad]
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
