//! Blue-origin to alliance-relative coordinate flipping.
//!
//! Field coordinates always have their origin in the blue alliance's corner.
//! Positions authored from the blue perspective (start poses, scoring spots)
//! are mirrored through the field centre when playing on red: `x → L − x`,
//! `y → W − y`, heading rotated by π.  Every function is the identity for
//! blue and unknown alliances.

use std::f64::consts::PI;

use tagfuse_types::geometry::normalize_angle;
use tagfuse_types::{Alliance, Pose2D, Pose3D, Quaternion, Translation2D, Vec3};

use crate::field_layout::FieldLayout;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllianceFlip {
    pub field_length: f64,
    pub field_width: f64,
}

impl AllianceFlip {
    pub fn new(field_length: f64, field_width: f64) -> Self {
        Self {
            field_length,
            field_width,
        }
    }

    pub fn from_layout(layout: &FieldLayout) -> Self {
        Self::new(layout.field_length(), layout.field_width())
    }

    pub fn should_flip(alliance: Alliance) -> bool {
        alliance == Alliance::Red
    }

    pub fn flip_x(&self, x: f64, alliance: Alliance) -> f64 {
        if Self::should_flip(alliance) { self.field_length - x } else { x }
    }

    pub fn flip_y(&self, y: f64, alliance: Alliance) -> f64 {
        if Self::should_flip(alliance) { self.field_width - y } else { y }
    }

    pub fn flip_translation2d(&self, t: Translation2D, alliance: Alliance) -> Translation2D {
        Translation2D::new(self.flip_x(t.x, alliance), self.flip_y(t.y, alliance))
    }

    /// Heading in radians.
    pub fn flip_rotation2d(&self, heading_rad: f64, alliance: Alliance) -> f64 {
        if Self::should_flip(alliance) {
            normalize_angle(heading_rad + PI)
        } else {
            heading_rad
        }
    }

    pub fn flip_pose2d(&self, pose: Pose2D, alliance: Alliance) -> Pose2D {
        let t = self.flip_translation2d(pose.translation(), alliance);
        Pose2D::new(t.x, t.y, self.flip_rotation2d(pose.heading_rad, alliance))
    }

    /// Z is unchanged.
    pub fn flip_translation3d(&self, t: Vec3, alliance: Alliance) -> Vec3 {
        Vec3::new(self.flip_x(t.x, alliance), self.flip_y(t.y, alliance), t.z)
    }

    /// Rotation is turned half a revolution about the field's vertical axis.
    pub fn flip_pose3d(&self, pose: Pose3D, alliance: Alliance) -> Pose3D {
        if !Self::should_flip(alliance) {
            return pose;
        }
        Pose3D::new(
            self.flip_translation3d(pose.translation, alliance),
            Quaternion::from_yaw(PI).mul(pose.rotation).normalized(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLIP: AllianceFlip = AllianceFlip {
        field_length: 17.5,
        field_width: 8.0,
    };

    #[test]
    fn only_red_flips() {
        assert!(AllianceFlip::should_flip(Alliance::Red));
        assert!(!AllianceFlip::should_flip(Alliance::Blue));
        assert!(!AllianceFlip::should_flip(Alliance::Unknown));
    }

    #[test]
    fn scalars_mirror_through_field_centre() {
        assert_eq!(FLIP.flip_x(2.0, Alliance::Red), 15.5);
        assert_eq!(FLIP.flip_y(1.0, Alliance::Red), 7.0);
        assert_eq!(FLIP.flip_x(2.0, Alliance::Blue), 2.0);
        assert_eq!(FLIP.flip_y(1.0, Alliance::Unknown), 1.0);
    }

    #[test]
    fn pose2d_flip_turns_heading_around() {
        let p = FLIP.flip_pose2d(Pose2D::new(2.0, 1.0, 0.25), Alliance::Red);
        assert!((p.x - 15.5).abs() < 1e-12);
        assert!((p.y - 7.0).abs() < 1e-12);
        assert!((p.heading_rad - normalize_angle(0.25 + PI)).abs() < 1e-12);

        let blue = Pose2D::new(2.0, 1.0, 0.25);
        assert_eq!(FLIP.flip_pose2d(blue, Alliance::Blue), blue);
    }

    #[test]
    fn flipping_twice_is_identity() {
        let p = Pose2D::new(3.3, 2.2, -1.0);
        let back = FLIP.flip_pose2d(FLIP.flip_pose2d(p, Alliance::Red), Alliance::Red);
        assert!((back.x - p.x).abs() < 1e-12);
        assert!((back.y - p.y).abs() < 1e-12);
        assert!((back.heading_rad - p.heading_rad).abs() < 1e-12);
    }

    #[test]
    fn translation3d_keeps_height() {
        let t = FLIP.flip_translation3d(Vec3::new(1.0, 2.0, 0.5), Alliance::Red);
        assert_eq!((t.x, t.y, t.z), (16.5, 6.0, 0.5));
    }

    #[test]
    fn pose3d_flip_matches_planar_flip() {
        let pose = Pose3D::new(Vec3::new(4.0, 3.0, 0.3), Quaternion::from_yaw(0.4));
        let flipped = FLIP.flip_pose3d(pose, Alliance::Red).to_pose2d();
        let expected = FLIP.flip_pose2d(pose.to_pose2d(), Alliance::Red);
        assert!((flipped.x - expected.x).abs() < 1e-9);
        assert!((flipped.y - expected.y).abs() < 1e-9);
        assert!((flipped.heading_rad - expected.heading_rad).abs() < 1e-9);
        assert_eq!(FLIP.flip_pose3d(pose, Alliance::Blue), pose);
    }

    #[test]
    fn from_layout_uses_field_dimensions() {
        let layout = FieldLayout::new(Vec::new(), 17.548, 8.052);
        let flip = AllianceFlip::from_layout(&layout);
        assert_eq!(flip, AllianceFlip::new(17.548, 8.052));
    }
}
