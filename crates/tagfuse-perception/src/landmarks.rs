//! Trusted landmarks and the nearest-landmark locator.
//!
//! Each alliance owns one contiguous band of six reef tags.  Those are the only
//! tags whose detections the trust filter fuses, and the only ones the
//! locator searches.

use serde::{Deserialize, Serialize};
use tagfuse_types::{Alliance, Pose2D};

use crate::field_layout::FieldLayout;

/// Blue alliance reef tag ids.
pub const BLUE_REEF_TAGS: [i32; 6] = [17, 18, 19, 20, 21, 22];
/// Red alliance reef tag ids.
pub const RED_REEF_TAGS: [i32; 6] = [6, 7, 8, 9, 10, 11];

/// The trusted-landmark id list of each alliance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkBands {
    pub blue: Vec<i32>,
    pub red: Vec<i32>,
}

impl Default for LandmarkBands {
    fn default() -> Self {
        Self {
            blue: BLUE_REEF_TAGS.to_vec(),
            red: RED_REEF_TAGS.to_vec(),
        }
    }
}

impl LandmarkBands {
    /// Ids belonging to `alliance`; empty for [`Alliance::Unknown`].
    pub fn for_alliance(&self, alliance: Alliance) -> &[i32] {
        match alliance {
            Alliance::Blue => &self.blue,
            Alliance::Red => &self.red,
            Alliance::Unknown => &[],
        }
    }

    /// Ids of the opposing alliance's landmarks; empty when the alliance is
    /// unknown, which disables opponent filtering.
    pub fn opponent_band(&self, alliance: Alliance) -> &[i32] {
        match alliance.opponent() {
            Some(opponent) => self.for_alliance(opponent),
            None => &[],
        }
    }

    /// `true` if `id` is a landmark of either alliance.
    pub fn is_trusted(&self, id: i32) -> bool {
        self.blue.contains(&id) || self.red.contains(&id)
    }

    /// A copy of `layout` containing only trusted landmarks.
    pub fn filter_layout(&self, layout: &FieldLayout) -> FieldLayout {
        layout.filtered(|tag| self.is_trusted(tag.id))
    }

    /// Ground-plane poses of `alliance`'s landmarks, in list order.  Ids the
    /// layout does not know are skipped.
    pub fn landmark_poses(&self, alliance: Alliance, layout: &FieldLayout) -> Vec<(i32, Pose2D)> {
        self.for_alliance(alliance)
            .iter()
            .filter_map(|&id| layout.tag_pose(id).map(|p| (id, p.to_pose2d())))
            .collect()
    }

    /// The landmark of `alliance` closest to `pose`.
    ///
    /// Ties go to the landmark listed first.  Returns `None` when the alliance
    /// is unknown or none of its landmarks are in the layout.
    pub fn nearest_landmark(
        &self,
        pose: Pose2D,
        alliance: Alliance,
        layout: &FieldLayout,
    ) -> Option<Pose2D> {
        let candidates: Vec<Pose2D> = self
            .landmark_poses(alliance, layout)
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        pose.nearest(&candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_layout::FieldTag;
    use tagfuse_types::{Pose3D, Quaternion, Vec3};

    fn tag(id: i32, x: f64, y: f64) -> FieldTag {
        FieldTag {
            id,
            pose: Pose3D::new(Vec3::new(x, y, 0.3), Quaternion::from_yaw(0.5)),
        }
    }

    fn layout() -> FieldLayout {
        FieldLayout::new(
            vec![
                tag(17, 4.0, 3.0),
                tag(18, 3.6, 4.0),
                tag(19, 4.0, 5.0),
                tag(20, 5.0, 5.0),
                // 21 deliberately absent
                tag(22, 5.0, 3.0),
                tag(7, 13.9, 4.0),
                tag(8, 13.4, 5.0),
                tag(1, 16.0, 0.5),
            ],
            17.548,
            8.052,
        )
    }

    #[test]
    fn opponent_band_follows_alliance() {
        let bands = LandmarkBands::default();
        assert_eq!(bands.opponent_band(Alliance::Blue), &RED_REEF_TAGS);
        assert_eq!(bands.opponent_band(Alliance::Red), &BLUE_REEF_TAGS);
        assert!(bands.opponent_band(Alliance::Unknown).is_empty());
    }

    #[test]
    fn trusted_covers_both_bands_only() {
        let bands = LandmarkBands::default();
        for id in 6..=11 {
            assert!(bands.is_trusted(id));
        }
        for id in 17..=22 {
            assert!(bands.is_trusted(id));
        }
        for id in [1, 5, 12, 16, 23, -1] {
            assert!(!bands.is_trusted(id), "{id} must not be trusted");
        }
    }

    #[test]
    fn landmark_poses_skip_missing_ids() {
        let bands = LandmarkBands::default();
        let ids: Vec<i32> = bands
            .landmark_poses(Alliance::Blue, &layout())
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![17, 18, 19, 20, 22]);
    }

    #[test]
    fn nearest_returns_strict_minimum() {
        let bands = LandmarkBands::default();
        let robot = Pose2D::new(5.2, 5.1, 0.0);
        let nearest = bands.nearest_landmark(robot, Alliance::Blue, &layout()).unwrap();
        assert!((nearest.x - 5.0).abs() < 1e-9 && (nearest.y - 5.0).abs() < 1e-9);
        assert!((nearest.heading_rad - 0.5).abs() < 1e-9);
    }

    #[test]
    fn nearest_breaks_ties_by_list_order() {
        let bands = LandmarkBands::default();
        // Equidistant from 17 (4,3) and 22 (5,3); 17 is listed first.
        let robot = Pose2D::new(4.5, 2.0, 0.0);
        let nearest = bands.nearest_landmark(robot, Alliance::Blue, &layout()).unwrap();
        assert!((nearest.x - 4.0).abs() < 1e-9);
    }

    #[test]
    fn nearest_uses_red_band_for_red() {
        let bands = LandmarkBands::default();
        let robot = Pose2D::new(4.0, 3.0, 0.0);
        let nearest = bands.nearest_landmark(robot, Alliance::Red, &layout()).unwrap();
        assert!(nearest.x > 13.0, "red search must ignore blue landmarks");
    }

    #[test]
    fn nearest_none_for_unknown_or_empty() {
        let bands = LandmarkBands::default();
        let robot = Pose2D::default();
        assert!(bands.nearest_landmark(robot, Alliance::Unknown, &layout()).is_none());
        let empty = FieldLayout::new(Vec::new(), 17.548, 8.052);
        assert!(bands.nearest_landmark(robot, Alliance::Blue, &empty).is_none());
    }

    #[test]
    fn filter_layout_keeps_reef_tags() {
        let bands = LandmarkBands::default();
        let reef = bands.filter_layout(&layout());
        assert_eq!(reef.len(), 7);
        assert!(reef.tag_pose(1).is_none());
    }
}
