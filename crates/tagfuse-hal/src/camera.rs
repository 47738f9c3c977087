//! `Camera` trait and the detection data it produces.
//!
//! A camera coprocessor runs fiducial detection on every image and queues one
//! [`DetectionFrame`] per processed image.  The robot drains that queue once per
//! control tick through [`Camera::unread_results`].

use serde::{Deserialize, Serialize};
use tagfuse_types::{Transform3D, VisionError};

/// One fiducial seen in one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDetection {
    /// Fiducial id as printed on the tag.
    pub fiducial_id: i32,
    /// Pose of the tag relative to the camera.
    pub camera_to_tag: Transform3D,
    /// Solver ambiguity, lower is better.  Negative or NaN when the solver did
    /// not compute one.
    pub ambiguity: f64,
}

impl TagDetection {
    /// Ground-plane distance from the camera to the tag, ignoring height.
    pub fn planar_distance(&self) -> f64 {
        self.camera_to_tag.translation.to_translation2d().norm()
    }

    /// `true` when the ambiguity score can be used for ranking.
    pub fn has_ambiguity(&self) -> bool {
        self.ambiguity.is_finite() && self.ambiguity >= 0.0
    }
}

/// A multi-tag solve computed on the camera coprocessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTagResult {
    /// Pose of the camera in field coordinates.
    pub field_to_camera: Transform3D,
    /// Fiducial ids that contributed to the solve.
    pub fiducial_ids: Vec<i32>,
}

/// Everything one camera detected in one processed image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionFrame {
    /// Capture time in seconds, on the same clock as the drivetrain's pose
    /// estimator.
    pub timestamp: f64,
    /// Detections in the order the coprocessor reported them.
    #[serde(default)]
    pub detections: Vec<TagDetection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_tag: Option<MultiTagResult>,
}

impl DetectionFrame {
    pub fn has_targets(&self) -> bool {
        !self.detections.is_empty()
    }

    pub fn fiducial_ids(&self) -> Vec<i32> {
        self.detections.iter().map(|d| d.fiducial_id).collect()
    }
}

/// A fiducial-detecting camera.
pub trait Camera {
    /// Stable identifier for this camera, e.g. `"Front_Left_Swerve"`.
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Return every frame produced since the previous call, oldest first.
    ///
    /// The read is destructive: a frame is returned by exactly one call.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::CameraFault`] if the result queue cannot be read.
    fn unread_results(&mut self) -> Result<Vec<DetectionFrame>, VisionError>;
}
