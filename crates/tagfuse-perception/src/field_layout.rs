//! Fiducial field layout.
//!
//! Reads and writes the standard AprilTag layout JSON shipped for each
//! season:
//!
//! ```json
//! {
//!   "tags": [
//!     { "ID": 18,
//!       "pose": { "translation": { "x": 3.6576, "y": 4.0259, "z": 0.3083 },
//!                 "rotation": { "quaternion": { "W": 0.0, "X": 0.0, "Y": 0.0, "Z": 1.0 } } } }
//!   ],
//!   "field": { "length": 17.548, "width": 8.052 }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tagfuse_types::{Pose3D, Quaternion, Vec3, VisionError};

use crate::landmarks::LandmarkBands;

/// A tag and its pose in field coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldTag {
    pub id: i32,
    pub pose: Pose3D,
}

/// Known tag poses plus the field dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayout {
    tags: BTreeMap<i32, FieldTag>,
    field_length: f64,
    field_width: f64,
}

impl FieldLayout {
    /// Build a layout.  A later tag with a duplicate id replaces the earlier one.
    pub fn new(tags: impl IntoIterator<Item = FieldTag>, field_length: f64, field_width: f64) -> Self {
        Self {
            tags: tags.into_iter().map(|t| (t.id, t)).collect(),
            field_length,
            field_width,
        }
    }

    /// Load a layout JSON file.
    ///
    /// # Errors
    ///
    /// [`VisionError::LayoutLoad`] if the file cannot be read and
    /// [`VisionError::LayoutParse`] if its contents are not a valid layout.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, VisionError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| VisionError::LayoutLoad {
            path: path.display().to_string(),
            details: e.to_string(),
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(json: &str) -> Result<Self, VisionError> {
        let raw: RawLayout =
            serde_json::from_str(json).map_err(|e| VisionError::LayoutParse(e.to_string()))?;
        if !(raw.field.length > 0.0 && raw.field.width > 0.0) {
            return Err(VisionError::LayoutParse(format!(
                "field dimensions must be positive, got {} x {}",
                raw.field.length, raw.field.width
            )));
        }
        let tags = raw.tags.into_iter().map(|t| FieldTag {
            id: t.id,
            pose: Pose3D::new(
                Vec3::new(t.pose.translation.x, t.pose.translation.y, t.pose.translation.z),
                Quaternion::new(
                    t.pose.rotation.quaternion.w,
                    t.pose.rotation.quaternion.x,
                    t.pose.rotation.quaternion.y,
                    t.pose.rotation.quaternion.z,
                )
                .normalized(),
            ),
        });
        Ok(Self::new(tags, raw.field.length, raw.field.width))
    }

    pub fn to_json_string(&self) -> Result<String, VisionError> {
        let raw = RawLayout {
            tags: self
                .tags
                .values()
                .map(|t| RawTag {
                    id: t.id,
                    pose: RawPose {
                        translation: t.pose.translation,
                        rotation: RawRotation {
                            quaternion: RawQuaternion {
                                w: t.pose.rotation.w,
                                x: t.pose.rotation.x,
                                y: t.pose.rotation.y,
                                z: t.pose.rotation.z,
                            },
                        },
                    },
                })
                .collect(),
            field: RawField {
                length: self.field_length,
                width: self.field_width,
            },
        };
        serde_json::to_string_pretty(&raw).map_err(|e| VisionError::LayoutParse(e.to_string()))
    }

    /// Field pose of tag `id`, or `None` if the layout does not know it.
    pub fn tag_pose(&self, id: i32) -> Option<Pose3D> {
        self.tags.get(&id).map(|t| t.pose)
    }

    /// All tags in ascending id order.
    pub fn tags(&self) -> impl Iterator<Item = &FieldTag> {
        self.tags.values()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn field_length(&self) -> f64 {
        self.field_length
    }

    pub fn field_width(&self) -> f64 {
        self.field_width
    }

    /// A copy of this layout keeping only the tags `keep` accepts.
    pub fn filtered(&self, mut keep: impl FnMut(&FieldTag) -> bool) -> Self {
        Self::new(
            self.tags.values().filter(|t| keep(t)).copied(),
            self.field_length,
            self.field_width,
        )
    }

    /// Only the default reef landmark bands of both alliances.
    pub fn reef_only(&self) -> Self {
        LandmarkBands::default().filter_layout(self)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// JSON shape
// ────────────────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct RawLayout {
    tags: Vec<RawTag>,
    field: RawField,
}

#[derive(Serialize, Deserialize)]
struct RawTag {
    #[serde(rename = "ID")]
    id: i32,
    pose: RawPose,
}

#[derive(Serialize, Deserialize)]
struct RawPose {
    translation: Vec3,
    rotation: RawRotation,
}

#[derive(Serialize, Deserialize)]
struct RawRotation {
    quaternion: RawQuaternion,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
struct RawQuaternion {
    w: f64,
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Serialize, Deserialize)]
struct RawField {
    length: f64,
    width: f64,
}
