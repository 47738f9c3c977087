//! Per-camera robot pose estimation from fiducial detections.
//!
//! Strategies are tried in priority order:
//!
//! 1. **Multi-tag** – all detections solved jointly.  When the coprocessor has
//!    already produced a joint solve it is used as-is and every detection in
//!    the frame counts as used, so the trust filter sees all of them; otherwise every known
//!    tag yields a robot pose and the poses are averaged.  A joint solve needs
//!    at least two known tags whose individual estimates agree to within
//!    [`EstimatorConfig::multi_tag_consistency_m`].
//! 2. **Lowest ambiguity** – the single known tag with the lowest ambiguity.
//!
//! For a single tag the robot pose is
//!
//! ```text
//! field_to_robot = field_to_tag ∘ camera_to_tag⁻¹ ∘ robot_to_camera⁻¹
//! ```
//!
//! Tags missing from the field layout, and detections whose transform yields
//! a non-finite pose, are skipped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tagfuse_hal::camera::{DetectionFrame, TagDetection};
use tagfuse_types::geometry::normalize_angle;
use tagfuse_types::{Pose2D, Pose3D, Quaternion, Transform3D, Vec3};
use tracing::trace;

use crate::field_layout::FieldLayout;

/// Which solve produced a [`CandidatePose`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationStrategy {
    MultiTag,
    LowestAmbiguity,
}

/// A robot pose estimated from one detection frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePose {
    /// Estimated robot pose in field coordinates.
    pub pose: Pose3D,
    /// Timestamp of the source frame (seconds).
    pub timestamp: f64,
    /// Detections the solve used, in the order the camera reported them.
    pub tags_used: Vec<TagDetection>,
    pub strategy: EstimationStrategy,
}

impl CandidatePose {
    /// The estimate projected onto the ground plane.
    pub fn pose2d(&self) -> Pose2D {
        self.pose.to_pose2d()
    }

    pub fn tag_count(&self) -> usize {
        self.tags_used.len()
    }

    /// The first detection used; the trust filter classifies on it.
    pub fn primary(&self) -> Option<&TagDetection> {
        self.tags_used.first()
    }
}

/// Tunables for [`PoseEstimator`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Largest planar distance (metres) between any single-tag estimate and
    /// the joint mean before a local multi-tag solve is treated as degenerate.
    pub multi_tag_consistency_m: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            multi_tag_consistency_m: 1.0,
        }
    }
}

/// Converts detection frames from one camera into [`CandidatePose`]s.
#[derive(Debug, Clone)]
pub struct PoseEstimator {
    layout: Arc<FieldLayout>,
    robot_to_camera: Transform3D,
    config: EstimatorConfig,
}

impl PoseEstimator {
    /// `robot_to_camera` is the camera's mounting pose relative to the robot
    /// centre.
    pub fn new(layout: Arc<FieldLayout>, robot_to_camera: Transform3D) -> Self {
        Self::with_config(layout, robot_to_camera, EstimatorConfig::default())
    }

    pub fn with_config(
        layout: Arc<FieldLayout>,
        robot_to_camera: Transform3D,
        config: EstimatorConfig,
    ) -> Self {
        Self {
            layout,
            robot_to_camera,
            config,
        }
    }

    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    pub fn robot_to_camera(&self) -> Transform3D {
        self.robot_to_camera
    }

    /// Estimate the robot pose from `frame`.
    ///
    /// Returns `None` when the frame has no detections or no strategy can
    /// produce a pose from the tags the layout knows.
    pub fn estimate(&self, frame: &DetectionFrame) -> Option<CandidatePose> {
        if frame.detections.is_empty() {
            return None;
        }
        self.coprocessor_multi_tag(frame)
            .or_else(|| self.local_multi_tag(frame))
            .or_else(|| self.lowest_ambiguity(frame))
    }

    /// Robot pose implied by a single detection, if its tag is in the layout.
    pub fn robot_pose_from_tag(&self, detection: &TagDetection) -> Option<Pose3D> {
        let field_to_tag = self.layout.tag_pose(detection.fiducial_id)?;
        let pose = field_to_tag
            .compose(detection.camera_to_tag.inverse())
            .compose(self.robot_to_camera.inverse());
        if !pose.is_finite() {
            trace!(id = detection.fiducial_id, "non-finite tag transform; skipped");
            return None;
        }
        Some(pose)
    }

    fn coprocessor_multi_tag(&self, frame: &DetectionFrame) -> Option<CandidatePose> {
        let multi = frame.multi_tag.as_ref()?;
        if !frame
            .detections
            .iter()
            .any(|d| multi.fiducial_ids.contains(&d.fiducial_id))
        {
            trace!("coprocessor multi-tag result shares no ids with the frame");
            return None;
        }
        let pose = multi.field_to_camera.compose(self.robot_to_camera.inverse());
        if !pose.is_finite() {
            trace!("coprocessor multi-tag result is not finite");
            return None;
        }
        Some(CandidatePose {
            pose,
            timestamp: frame.timestamp,
            tags_used: frame.detections.clone(),
            strategy: EstimationStrategy::MultiTag,
        })
    }

    fn local_multi_tag(&self, frame: &DetectionFrame) -> Option<CandidatePose> {
        let solved: Vec<(&TagDetection, Pose3D)> = frame
            .detections
            .iter()
            .filter_map(|d| self.robot_pose_from_tag(d).map(|p| (d, p)))
            .collect();
        if solved.len() < 2 {
            return None;
        }

        let n = solved.len() as f64;
        let mut sum = Vec3::zero();
        let (mut sin_sum, mut cos_sum) = (0.0, 0.0);
        for (_, pose) in &solved {
            sum = sum.add(pose.translation);
            let yaw = pose.rotation.yaw();
            sin_sum += yaw.sin();
            cos_sum += yaw.cos();
        }
        if sin_sum.hypot(cos_sum) < 1e-6 * n {
            trace!("multi-tag headings cancel out");
            return None;
        }
        let mean = sum.scale(1.0 / n);
        let mean_2d = mean.to_translation2d();

        let spread = solved
            .iter()
            .map(|(_, p)| p.translation.to_translation2d().distance(mean_2d))
            .fold(0.0_f64, f64::max);
        if spread > self.config.multi_tag_consistency_m {
            trace!(spread, "multi-tag estimates disagree; falling back");
            return None;
        }

        let heading = normalize_angle(sin_sum.atan2(cos_sum));
        Some(CandidatePose {
            pose: Pose3D::new(mean, Quaternion::from_yaw(heading)),
            timestamp: frame.timestamp,
            tags_used: solved.into_iter().map(|(d, _)| d.clone()).collect(),
            strategy: EstimationStrategy::MultiTag,
        })
    }

    fn lowest_ambiguity(&self, frame: &DetectionFrame) -> Option<CandidatePose> {
        let mut best: Option<(&TagDetection, Pose3D)> = None;
        for detection in frame.detections.iter().filter(|d| d.has_ambiguity()) {
            let Some(pose) = self.robot_pose_from_tag(detection) else {
                trace!(id = detection.fiducial_id, "tag not in field layout; skipped");
                continue;
            };
            match best {
                Some((current, _)) if detection.ambiguity >= current.ambiguity => {}
                _ => best = Some((detection, pose)),
            }
        }
        let (detection, pose) = best?;
        Some(CandidatePose {
            pose,
            timestamp: frame.timestamp,
            tags_used: vec![detection.clone()],
            strategy: EstimationStrategy::LowestAmbiguity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_layout::FieldTag;
    use std::f64::consts::PI;
    use tagfuse_hal::camera::MultiTagResult;

    /// Two tags on a wall at x = 5, both facing back toward -X.
    fn layout() -> Arc<FieldLayout> {
        let facing_back = Quaternion::from_yaw(PI);
        Arc::new(FieldLayout::new(
            vec![
                FieldTag {
                    id: 18,
                    pose: Pose3D::new(Vec3::new(5.0, 4.0, 0.3), facing_back),
                },
                FieldTag {
                    id: 19,
                    pose: Pose3D::new(Vec3::new(5.0, 5.0, 0.3), facing_back),
                },
            ],
            17.548,
            8.052,
        ))
    }

    /// Detection of `tag_field_pose` from a camera at `camera_field_pose`.
    fn observe(id: i32, layout: &FieldLayout, camera_field_pose: Pose3D, ambiguity: f64) -> TagDetection {
        let field_to_tag = layout.tag_pose(id).unwrap();
        TagDetection {
            fiducial_id: id,
            camera_to_tag: camera_field_pose.inverse().compose(field_to_tag),
            ambiguity,
        }
    }

    fn frame(detections: Vec<TagDetection>) -> DetectionFrame {
        DetectionFrame {
            timestamp: 12.5,
            detections,
            multi_tag: None,
        }
    }

    fn assert_pose_near(actual: Pose2D, expected: Pose2D) {
        assert!((actual.x - expected.x).abs() < 1e-6, "x {} vs {}", actual.x, expected.x);
        assert!((actual.y - expected.y).abs() < 1e-6, "y {} vs {}", actual.y, expected.y);
        assert!(
            normalize_angle(actual.heading_rad - expected.heading_rad).abs() < 1e-6,
            "heading {} vs {}",
            actual.heading_rad,
            expected.heading_rad
        );
    }

    #[test]
    fn empty_frame_has_no_estimate() {
        let est = PoseEstimator::new(layout(), Transform3D::identity());
        assert!(est.estimate(&frame(Vec::new())).is_none());
    }

    #[test]
    fn single_tag_recovers_robot_pose_through_camera_offset() {
        let layout = layout();
        let robot = Pose3D::new(Vec3::new(3.0, 4.5, 0.0), Quaternion::from_yaw(0.2));
        let robot_to_camera = Transform3D::new(Vec3::new(0.3, -0.2, 0.25), Quaternion::from_euler(0.0, -0.3, 0.1));
        let camera = robot.compose(robot_to_camera);

        let est = PoseEstimator::new(layout.clone(), robot_to_camera);
        let candidate = est.estimate(&frame(vec![observe(18, &layout, camera, 0.05)])).unwrap();

        assert_eq!(candidate.strategy, EstimationStrategy::LowestAmbiguity);
        assert_eq!(candidate.tag_count(), 1);
        assert_eq!(candidate.timestamp, 12.5);
        assert_pose_near(candidate.pose2d(), robot.to_pose2d());
    }

    #[test]
    fn multi_tag_preferred_when_two_known_tags_agree() {
        let layout = layout();
        let robot = Pose3D::new(Vec3::new(2.0, 4.2, 0.0), Quaternion::from_yaw(-0.1));
        let est = PoseEstimator::new(layout.clone(), Transform3D::identity());
        let candidate = est
            .estimate(&frame(vec![
                observe(19, &layout, robot, 0.3),
                observe(18, &layout, robot, 0.1),
            ]))
            .unwrap();

        assert_eq!(candidate.strategy, EstimationStrategy::MultiTag);
        let ids: Vec<i32> = candidate.tags_used.iter().map(|d| d.fiducial_id).collect();
        assert_eq!(ids, vec![19, 18]);
        assert_pose_near(candidate.pose2d(), robot.to_pose2d());
    }

    #[test]
    fn inconsistent_tags_fall_back_to_lowest_ambiguity() {
        let layout = layout();
        let robot = Pose3D::new(Vec3::new(2.0, 4.2, 0.0), Quaternion::identity());
        let ghost = Pose3D::new(Vec3::new(0.0, 1.0, 0.0), Quaternion::identity());
        let est = PoseEstimator::new(layout.clone(), Transform3D::identity());
        let candidate = est
            .estimate(&frame(vec![
                observe(18, &layout, ghost, 0.4),
                observe(19, &layout, robot, 0.05),
            ]))
            .unwrap();

        assert_eq!(candidate.strategy, EstimationStrategy::LowestAmbiguity);
        assert_eq!(candidate.tags_used[0].fiducial_id, 19);
        assert_pose_near(candidate.pose2d(), robot.to_pose2d());
    }

    #[test]
    fn unknown_tags_are_skipped_not_fatal() {
        let layout = layout();
        let robot = Pose3D::new(Vec3::new(1.0, 4.0, 0.0), Quaternion::identity());
        let mut stray = observe(18, &layout, robot, 0.01);
        stray.fiducial_id = 42;
        let est = PoseEstimator::new(layout.clone(), Transform3D::identity());

        let candidate = est
            .estimate(&frame(vec![stray.clone(), observe(18, &layout, robot, 0.2)]))
            .unwrap();
        assert_eq!(candidate.tags_used[0].fiducial_id, 18);

        assert!(est.estimate(&frame(vec![stray])).is_none());
    }

    #[test]
    fn lowest_ambiguity_ignores_uncomputed_scores() {
        let layout = layout();
        let robot = Pose3D::new(Vec3::new(1.0, 4.0, 0.0), Quaternion::identity());
        let est = PoseEstimator::new(
            layout.clone(),
            Transform3D::identity(),
        );
        let only_unscored = frame(vec![observe(18, &layout, robot, -1.0)]);
        assert!(est.estimate(&only_unscored).is_none());
    }

    #[test]
    fn coprocessor_multi_tag_result_takes_priority() {
        let layout = layout();
        let robot = Pose3D::new(Vec3::new(2.5, 4.5, 0.0), Quaternion::from_yaw(0.4));
        let robot_to_camera = Transform3D::new(Vec3::new(0.2, 0.0, 0.3), Quaternion::identity());
        let camera = robot.compose(robot_to_camera);
        let est = PoseEstimator::new(layout.clone(), robot_to_camera);

        let mut f = frame(vec![
            observe(18, &layout, camera, 0.2),
            observe(19, &layout, camera, 0.2),
        ]);
        f.multi_tag = Some(MultiTagResult {
            field_to_camera: camera,
            fiducial_ids: vec![18],
        });
        let candidate = est.estimate(&f).unwrap();
        assert_eq!(candidate.strategy, EstimationStrategy::MultiTag);
        // Every detection in the frame counts, not just the solver's ids.
        let ids: Vec<i32> = candidate.tags_used.iter().map(|d| d.fiducial_id).collect();
        assert_eq!(ids, vec![18, 19]);
        assert_pose_near(candidate.pose2d(), robot.to_pose2d());
    }

    #[test]
    fn coprocessor_solve_keeps_opponent_tag_visible_to_trust_filter() {
        use crate::trust::{RejectReason, TrustDecision, TrustFilter};
        use tagfuse_types::Alliance;

        let camera = Pose3D::new(Vec3::new(2.5, 4.5, 0.0), Quaternion::identity());
        let own = TagDetection {
            fiducial_id: 20,
            camera_to_tag: Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()),
            ambiguity: 0.1,
        };
        let opponent = TagDetection {
            fiducial_id: 8,
            ..own.clone()
        };
        let mut f = frame(vec![own, opponent]);
        f.multi_tag = Some(MultiTagResult {
            field_to_camera: camera,
            fiducial_ids: vec![20],
        });

        let candidate = PoseEstimator::new(layout(), Transform3D::identity())
            .estimate(&f)
            .unwrap();
        assert_eq!(candidate.tag_count(), 2);
        let report = TrustFilter::default().decide(&candidate, Alliance::Blue);
        assert_eq!(report.decision, TrustDecision::Reject(RejectReason::OpponentTag { id: 8 }));
    }

    #[test]
    fn non_finite_coprocessor_result_falls_back() {
        let layout = layout();
        let robot = Pose3D::new(Vec3::new(2.5, 4.5, 0.0), Quaternion::identity());
        let est = PoseEstimator::new(layout.clone(), Transform3D::identity());
        let mut f = frame(vec![observe(18, &layout, robot, 0.2)]);
        f.multi_tag = Some(MultiTagResult {
            field_to_camera: Pose3D::new(Vec3::new(f64::NAN, 0.0, 0.0), Quaternion::identity()),
            fiducial_ids: vec![18],
        });
        let candidate = est.estimate(&f).unwrap();
        assert_eq!(candidate.strategy, EstimationStrategy::LowestAmbiguity);
        assert!(candidate.pose.is_finite());
    }

    #[test]
    fn non_finite_detections_are_skipped() {
        let layout = layout();
        let robot = Pose3D::new(Vec3::new(1.5, 4.2, 0.0), Quaternion::identity());
        let est = PoseEstimator::new(layout.clone(), Transform3D::identity());

        let mut nan = observe(18, &layout, robot, 0.01);
        nan.camera_to_tag.translation.x = f64::NAN;
        let mut inf = observe(18, &layout, robot, 0.01);
        inf.camera_to_tag.translation.y = f64::INFINITY;
        assert!(est.estimate(&frame(vec![nan.clone()])).is_none());
        assert!(est.estimate(&frame(vec![inf])).is_none());

        // The bad tag drops out and the good one is solved alone.
        let candidate = est
            .estimate(&frame(vec![nan, observe(19, &layout, robot, 0.3)]))
            .unwrap();
        assert_eq!(candidate.strategy, EstimationStrategy::LowestAmbiguity);
        assert_eq!(candidate.tags_used[0].fiducial_id, 19);
        assert_pose_near(candidate.pose2d(), robot.to_pose2d());
    }

    #[test]
    fn nan_ambiguity_is_passed_over_for_a_scored_tag() {
        let layout = layout();
        let robot = Pose3D::new(Vec3::new(1.0, 4.0, 0.0), Quaternion::identity());
        let ghost = Pose3D::new(Vec3::new(-3.0, 1.0, 0.0), Quaternion::identity());
        let est = PoseEstimator::new(layout.clone(), Transform3D::identity());
        // Disagreeing tags force the single-tag path.
        let candidate = est
            .estimate(&frame(vec![
                observe(18, &layout, ghost, f64::NAN),
                observe(19, &layout, robot, 0.4),
            ]))
            .unwrap();
        assert_eq!(candidate.strategy, EstimationStrategy::LowestAmbiguity);
        assert_eq!(candidate.tags_used[0].fiducial_id, 19);
    }

    #[test]
    fn coprocessor_result_without_shared_ids_is_ignored() {
        let layout = layout();
        let robot = Pose3D::new(Vec3::new(2.5, 4.5, 0.0), Quaternion::identity());
        let est = PoseEstimator::new(layout.clone(), Transform3D::identity());
        let mut f = frame(vec![observe(18, &layout, robot, 0.2)]);
        f.multi_tag = Some(MultiTagResult {
            field_to_camera: Pose3D::identity(),
            fiducial_ids: vec![3, 4],
        });
        let candidate = est.estimate(&f).unwrap();
        assert_eq!(candidate.strategy, EstimationStrategy::LowestAmbiguity);
    }
}
