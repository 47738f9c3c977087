//! Measurement trust filter.
//!
//! Decides whether a [`CandidatePose`] is trustworthy enough to fuse and, if
//! so, with what standard deviations.  Checks run in order and the first
//! rejection wins:
//!
//! 1. **Empty** – a candidate with no detections is rejected.
//! 2. **Opponent tags** – if any detection belongs to the opposing alliance's
//!    landmark band the whole candidate is rejected.  Skipped when the
//!    alliance is unknown.
//! 3. **Primary classification** – the first detection must be a trusted
//!    landmark of either alliance.
//! 4. **Distance** – planar camera-to-tag distance of the primary detection.
//!    A NaN or infinite distance is rejected outright.
//! 5. **Single tag** – beyond `max_single_tag_distance` rejected; within
//!    `trusted_distance` accepted at `trusted_std_dev`, tightened to
//!    `close_std_dev` within `close_distance`; anything in between rejected.
//! 6. **Several tags** – rejected; multi-tag fusion is disabled.
//!
//! With the default [`TrustPolicy`]:
//!
//! ```text
//! distance   0 ──── 0.75 ──── 1.5 ──────── 2.5 ───────▶
//! decision   accept 0.1 │ accept 0.25 │ reject │ reject
//! ```

use serde::{Deserialize, Serialize};
use tagfuse_types::{Alliance, StdDevs};

use crate::estimator::CandidatePose;
use crate::landmarks::LandmarkBands;

/// Standard deviation reported in telemetry for a rejected measurement.
pub const REJECTED_STD_DEV: f64 = 2.0;

/// Thresholds used by [`TrustFilter`].  Distances in metres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustPolicy {
    pub landmarks: LandmarkBands,
    pub max_single_tag_distance: f64,
    pub trusted_distance: f64,
    pub close_distance: f64,
    pub trusted_std_dev: f64,
    pub close_std_dev: f64,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            landmarks: LandmarkBands::default(),
            max_single_tag_distance: 2.5,
            trusted_distance: 1.5,
            close_distance: 0.75,
            trusted_std_dev: 0.25,
            close_std_dev: 0.1,
        }
    }
}

/// Why a candidate was not fused.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    NoTags,
    OpponentTag { id: i32 },
    UntrustedPrimary { id: i32 },
    /// The primary detection's distance is NaN or infinite.
    InvalidDistance,
    TooFar { distance: f64 },
    /// Single tag between the trusted distance and the maximum distance.
    OutsideTrustBand { distance: f64 },
    MultiTagDisabled { tag_count: usize },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::NoTags => write!(f, "no tags"),
            RejectReason::OpponentTag { id } => write!(f, "opponent tag {id}"),
            RejectReason::UntrustedPrimary { id } => write!(f, "primary tag {id} is not a trusted landmark"),
            RejectReason::InvalidDistance => write!(f, "primary tag distance is not finite"),
            RejectReason::TooFar { distance } => write!(f, "tag too far ({distance:.2} m)"),
            RejectReason::OutsideTrustBand { distance } => {
                write!(f, "tag outside trust band ({distance:.2} m)")
            }
            RejectReason::MultiTagDisabled { tag_count } => {
                write!(f, "multi-tag fusion disabled ({tag_count} tags)")
            }
        }
    }
}

/// Outcome of [`TrustFilter::decide`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrustDecision {
    Accept(StdDevs),
    Reject(RejectReason),
}

impl TrustDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, TrustDecision::Accept(_))
    }

    pub fn std_devs(&self) -> Option<StdDevs> {
        match self {
            TrustDecision::Accept(s) => Some(*s),
            TrustDecision::Reject(_) => None,
        }
    }
}

/// A decision plus the figures it was based on, for telemetry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustReport {
    pub decision: TrustDecision,
    pub tag_count: usize,
    /// Planar distance to the primary tag; `None` if rejected before it was
    /// computed.
    pub distance: Option<f64>,
}

impl TrustReport {
    /// The single std-dev figure published for this decision.
    pub fn telemetry_std_dev(&self) -> f64 {
        self.decision.std_devs().map_or(REJECTED_STD_DEV, |s| s.x)
    }
}

/// Stateless measurement gate.
#[derive(Debug, Clone, Default)]
pub struct TrustFilter {
    policy: TrustPolicy,
}

impl TrustFilter {
    pub fn new(policy: TrustPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Decide whether to fuse `candidate`.  `alliance` must be the value
    /// current at the time of the call.
    pub fn decide(&self, candidate: &CandidatePose, alliance: Alliance) -> TrustReport {
        let tag_count = candidate.tag_count();
        let reject = |reason, distance| TrustReport {
            decision: TrustDecision::Reject(reason),
            tag_count,
            distance,
        };

        let Some(primary) = candidate.primary() else {
            return reject(RejectReason::NoTags, None);
        };

        let opponent_band = self.policy.landmarks.opponent_band(alliance);
        if let Some(tag) = candidate
            .tags_used
            .iter()
            .find(|t| opponent_band.contains(&t.fiducial_id))
        {
            return reject(RejectReason::OpponentTag { id: tag.fiducial_id }, None);
        }

        if !self.policy.landmarks.is_trusted(primary.fiducial_id) {
            return reject(RejectReason::UntrustedPrimary { id: primary.fiducial_id }, None);
        }

        let distance = primary.planar_distance();
        if !distance.is_finite() {
            return reject(RejectReason::InvalidDistance, None);
        }

        if tag_count >= 2 {
            return reject(RejectReason::MultiTagDisabled { tag_count }, Some(distance));
        }

        let p = &self.policy;
        if distance > p.max_single_tag_distance {
            return reject(RejectReason::TooFar { distance }, Some(distance));
        }
        if distance > p.trusted_distance {
            return reject(RejectReason::OutsideTrustBand { distance }, Some(distance));
        }

        let std_dev = if distance <= p.close_distance {
            p.close_std_dev
        } else {
            p.trusted_std_dev
        };
        TrustReport {
            decision: TrustDecision::Accept(StdDevs::uniform(std_dev)),
            tag_count,
            distance: Some(distance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::EstimationStrategy;
    use tagfuse_hal::camera::TagDetection;
    use tagfuse_types::{Pose3D, Quaternion, Transform3D, Vec3};

    fn tag(id: i32, distance: f64) -> TagDetection {
        TagDetection {
            fiducial_id: id,
            // Height must not count towards the distance.
            camera_to_tag: Transform3D::new(Vec3::new(distance, 0.0, 0.9), Quaternion::identity()),
            ambiguity: 0.1,
        }
    }

    fn candidate(tags: Vec<TagDetection>) -> CandidatePose {
        CandidatePose {
            pose: Pose3D::new(Vec3::new(3.0, 4.0, 0.0), Quaternion::identity()),
            timestamp: 1.0,
            tags_used: tags,
            strategy: EstimationStrategy::LowestAmbiguity,
        }
    }

    fn decide(tags: Vec<TagDetection>, alliance: Alliance) -> TrustReport {
        TrustFilter::default().decide(&candidate(tags), alliance)
    }

    // ── Scenarios ───────────────────────────────────────────────────────────

    #[test]
    fn blue_rejects_close_red_reef_tag() {
        let report = decide(vec![tag(8, 1.0)], Alliance::Blue);
        assert_eq!(report.decision, TrustDecision::Reject(RejectReason::OpponentTag { id: 8 }));
        assert_eq!(report.distance, None);
    }

    #[test]
    fn blue_accepts_very_close_own_reef_tag_tightly() {
        let report = decide(vec![tag(20, 0.5)], Alliance::Blue);
        assert_eq!(report.decision, TrustDecision::Accept(StdDevs::uniform(0.1)));
        assert!((report.distance.unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn blue_accepts_close_own_reef_tag() {
        let report = decide(vec![tag(20, 1.2)], Alliance::Blue);
        assert_eq!(report.decision, TrustDecision::Accept(StdDevs::uniform(0.25)));
        assert_eq!(report.tag_count, 1);
    }

    #[test]
    fn blue_rejects_multi_tag_reef_measurement() {
        let report = decide(vec![tag(20, 0.5), tag(21, 0.6)], Alliance::Blue);
        assert_eq!(
            report.decision,
            TrustDecision::Reject(RejectReason::MultiTagDisabled { tag_count: 2 })
        );
        assert_eq!(report.tag_count, 2);
        assert!(report.distance.is_some());
    }

    #[test]
    fn unknown_alliance_skips_opponent_filter_but_still_classifies() {
        // Red reef tag would be an opponent for blue; with no alliance it is
        // simply a trusted landmark.
        assert!(decide(vec![tag(8, 1.0)], Alliance::Unknown).decision.is_accept());
        assert!(decide(vec![tag(20, 1.0)], Alliance::Unknown).decision.is_accept());
        assert_eq!(
            decide(vec![tag(3, 1.0)], Alliance::Unknown).decision,
            TrustDecision::Reject(RejectReason::UntrustedPrimary { id: 3 })
        );
    }

    // ── Properties ──────────────────────────────────────────────────────────

    #[test]
    fn empty_candidate_always_rejected() {
        for alliance in [Alliance::Blue, Alliance::Red, Alliance::Unknown] {
            assert_eq!(
                decide(Vec::new(), alliance).decision,
                TrustDecision::Reject(RejectReason::NoTags)
            );
        }
    }

    #[test]
    fn any_opponent_tag_rejects_whole_candidate() {
        // Own primary, opponent tag later in the list.
        let report = decide(vec![tag(20, 0.3), tag(9, 0.4)], Alliance::Blue);
        assert_eq!(report.decision, TrustDecision::Reject(RejectReason::OpponentTag { id: 9 }));
        for id in 17..=22 {
            assert!(!decide(vec![tag(id, 0.3)], Alliance::Red).decision.is_accept());
        }
    }

    #[test]
    fn single_tag_acceptance_follows_distance_tiers() {
        let cases = [
            (0.0, Some(0.1)),
            (0.75, Some(0.1)),
            (0.76, Some(0.25)),
            (1.5, Some(0.25)),
            (1.51, None),
            (2.5, None),
            (2.51, None),
            (10.0, None),
        ];
        for (distance, expected) in cases {
            let report = decide(vec![tag(18, distance)], Alliance::Blue);
            assert_eq!(
                report.decision.std_devs().map(|s| s.x),
                expected,
                "distance {distance}"
            );
        }
    }

    #[test]
    fn gap_and_far_rejections_are_distinguished() {
        assert!(matches!(
            decide(vec![tag(18, 2.0)], Alliance::Blue).decision,
            TrustDecision::Reject(RejectReason::OutsideTrustBand { .. })
        ));
        assert!(matches!(
            decide(vec![tag(18, 3.0)], Alliance::Blue).decision,
            TrustDecision::Reject(RejectReason::TooFar { .. })
        ));
    }

    #[test]
    fn untrusted_primary_rejected_even_when_close() {
        for id in [1, 2, 12, 13, 16, 23] {
            assert_eq!(
                decide(vec![tag(id, 0.2)], Alliance::Blue).decision,
                TrustDecision::Reject(RejectReason::UntrustedPrimary { id })
            );
        }
    }

    #[test]
    fn accepted_std_devs_are_uniform() {
        let s = decide(vec![tag(6, 0.4)], Alliance::Red).decision.std_devs().unwrap();
        assert_eq!(s.as_array(), [0.1, 0.1, 0.1]);
    }

    #[test]
    fn telemetry_std_dev_uses_placeholder_for_rejections() {
        assert_eq!(decide(vec![tag(18, 2.0)], Alliance::Blue).telemetry_std_dev(), REJECTED_STD_DEV);
        assert_eq!(decide(vec![tag(18, 1.0)], Alliance::Blue).telemetry_std_dev(), 0.25);
    }

    #[test]
    fn custom_policy_thresholds_apply() {
        let filter = TrustFilter::new(TrustPolicy {
            trusted_distance: 2.5,
            ..TrustPolicy::default()
        });
        let report = filter.decide(&candidate(vec![tag(18, 2.0)]), Alliance::Blue);
        assert_eq!(report.decision, TrustDecision::Accept(StdDevs::uniform(0.25)));
    }

    #[test]
    fn non_finite_distance_is_never_fused() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let report = decide(vec![tag(20, bad)], Alliance::Blue);
            assert_eq!(report.decision, TrustDecision::Reject(RejectReason::InvalidDistance), "{bad}");
            assert_eq!(report.distance, None);
            assert_eq!(report.telemetry_std_dev(), REJECTED_STD_DEV);
        }
    }

    #[test]
    fn nan_lateral_offset_is_rejected() {
        let mut detection = tag(20, 0.5);
        detection.camera_to_tag.translation.y = f64::NAN;
        let report = decide(vec![detection], Alliance::Unknown);
        assert!(!report.decision.is_accept());
    }

    #[test]
    fn reject_reason_display() {
        assert_eq!(RejectReason::OpponentTag { id: 8 }.to_string(), "opponent tag 8");
        assert!(RejectReason::TooFar { distance: 3.0 }.to_string().contains("3.00"));
    }
}
