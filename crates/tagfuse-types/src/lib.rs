//! `tagfuse-types` – value types shared by every tagfuse crate.
//!
//! - [`geometry`] – rigid-body transforms, poses and angle helpers.
//! - [`Alliance`] – the match alliance colour.
//! - [`StdDevs`] – per-axis measurement confidence handed to the pose estimator.
//! - [`VisionError`] – the workspace error type.

pub mod geometry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use geometry::{Pose2D, Pose3D, Quaternion, Transform3D, Translation2D, Vec3};

/// Which alliance the robot is playing for this match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alliance {
    Blue,
    Red,
    /// The driver station has not reported an alliance yet.
    #[default]
    Unknown,
}

impl Alliance {
    /// The other alliance, or `None` when the alliance is unknown.
    pub fn opponent(self) -> Option<Alliance> {
        match self {
            Alliance::Blue => Some(Alliance::Red),
            Alliance::Red => Some(Alliance::Blue),
            Alliance::Unknown => None,
        }
    }
}

impl std::fmt::Display for Alliance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Alliance::Blue => write!(f, "blue"),
            Alliance::Red => write!(f, "red"),
            Alliance::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for Alliance {
    type Err = VisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blue" => Ok(Alliance::Blue),
            "red" => Ok(Alliance::Red),
            "unknown" | "" => Ok(Alliance::Unknown),
            other => Err(VisionError::Config(format!("unknown alliance '{other}'"))),
        }
    }
}

/// Measurement standard deviations for x, y (metres) and heading (radians).
///
/// Lower values tell the fusion sink to weight the measurement more heavily.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct StdDevs {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl StdDevs {
    pub const fn new(x: f64, y: f64, heading: f64) -> Self {
        Self { x, y, heading }
    }

    /// The same value on every axis.
    pub const fn uniform(v: f64) -> Self {
        Self::new(v, v, v)
    }

    /// A measurement that should never move the estimate.
    pub const fn infinite() -> Self {
        Self::uniform(f64::INFINITY)
    }

    pub fn scaled(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.heading * k)
    }

    pub fn as_array(self) -> [f64; 3] {
        [self.x, self.y, self.heading]
    }
}

impl From<[f64; 3]> for StdDevs {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<StdDevs> for [f64; 3] {
    fn from(s: StdDevs) -> Self {
        s.as_array()
    }
}

/// Errors raised while loading configuration or talking to collaborators.
///
/// Bad detections are routine input and never surface as errors; they are
/// rejected or skipped where they are found.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum VisionError {
    #[error("Field layout could not be read from {path}: {details}")]
    LayoutLoad { path: String, details: String },

    #[error("Field layout is malformed: {0}")]
    LayoutParse(String),

    #[error("Camera fault on {camera}: {details}")]
    CameraFault { camera: String, details: String },

    #[error("Configuration error: {0}")]
    Config(String),
}
