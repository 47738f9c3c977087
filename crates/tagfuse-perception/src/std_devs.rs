//! Distance-based measurement confidence.
//!
//! An alternative to the trust filter's fixed tiers: the further the robot
//! is from the tags it saw, the less a measurement is worth.
//!
//! ```text
//! std_devs = baseline × (1 + d² / 30)
//! ```
//!
//! where `d` is the mean planar distance from the estimated robot position to
//! the field poses of the tags used.  A lone tag further than
//! [`StdDevHeuristic::max_single_tag_distance`] yields infinite std-devs.

use serde::{Deserialize, Serialize};
use tagfuse_types::StdDevs;
use tracing::trace;

use crate::estimator::CandidatePose;
use crate::field_layout::FieldLayout;

pub const SINGLE_TAG_STD_DEVS: StdDevs = StdDevs::new(4.0, 4.0, 8.0);
pub const MULTI_TAG_STD_DEVS: StdDevs = StdDevs::new(0.5, 0.5, 1.0);

/// Baselines for [`StdDevHeuristic::recompute`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StdDevHeuristic {
    pub single_tag: StdDevs,
    pub multi_tag: StdDevs,
    pub max_single_tag_distance: f64,
}

impl Default for StdDevHeuristic {
    fn default() -> Self {
        Self {
            single_tag: SINGLE_TAG_STD_DEVS,
            multi_tag: MULTI_TAG_STD_DEVS,
            max_single_tag_distance: 4.0,
        }
    }
}

impl StdDevHeuristic {
    /// Std-devs for `candidate`.  Returns the single-tag baseline when there
    /// is no candidate or none of its tags are in `layout`.
    pub fn recompute(&self, candidate: Option<&CandidatePose>, layout: &FieldLayout) -> StdDevs {
        let Some(candidate) = candidate else {
            return self.single_tag;
        };
        let robot = candidate.pose2d().translation();

        let distances: Vec<f64> = candidate
            .tags_used
            .iter()
            .filter_map(|t| layout.tag_pose(t.fiducial_id))
            .map(|p| p.translation.to_translation2d().distance(robot))
            .collect();
        if distances.is_empty() {
            return self.single_tag;
        }

        let tag_count = distances.len();
        let mean = distances.iter().sum::<f64>() / tag_count as f64;
        if tag_count == 1 && mean > self.max_single_tag_distance {
            trace!(mean, "single tag too far, ignoring measurement");
            return StdDevs::infinite();
        }

        let baseline = if tag_count > 1 { self.multi_tag } else { self.single_tag };
        baseline.scaled(1.0 + mean * mean / 30.0)
    }
}

/// The most recent recomputed std-devs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StdDevState {
    current: StdDevs,
}

impl Default for StdDevState {
    fn default() -> Self {
        Self::new(SINGLE_TAG_STD_DEVS)
    }
}

impl StdDevState {
    pub fn new(initial: StdDevs) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> StdDevs {
        self.current
    }

    /// Recompute from `candidate` and store the result.
    pub fn update(
        &mut self,
        heuristic: &StdDevHeuristic,
        candidate: Option<&CandidatePose>,
        layout: &FieldLayout,
    ) -> StdDevs {
        self.current = heuristic.recompute(candidate, layout);
        self.current
    }
}
