//! `tagfuse-perception` – from fiducial detections to trusted pose measurements.
//!
//! Everything here is pure computation over the field layout and the frames a
//! camera produced; no module talks to a collaborator directly.
//!
//! # Modules
//!
//! - [`field_layout`] – [`FieldLayout`][field_layout::FieldLayout]: tag poses
//!   and field dimensions loaded from the season's layout JSON.
//! - [`estimator`] – [`PoseEstimator`][estimator::PoseEstimator]: turns one
//!   [`DetectionFrame`][tagfuse_hal::DetectionFrame] into a
//!   [`CandidatePose`][estimator::CandidatePose].
//! - [`trust`] – [`TrustFilter`][trust::TrustFilter]: accepts or rejects a
//!   candidate and picks its std-devs.
//! - [`std_devs`] – [`StdDevHeuristic`][std_devs::StdDevHeuristic]:
//!   distance-scaled std-devs, kept in a [`StdDevState`][std_devs::StdDevState].
//! - [`landmarks`] – [`LandmarkBands`][landmarks::LandmarkBands]: each
//!   alliance's trusted tags and the nearest-landmark locator.
//! - [`alliance_flip`] – [`AllianceFlip`][alliance_flip::AllianceFlip]:
//!   mirrors blue-perspective coordinates for the red alliance.

pub mod alliance_flip;
pub mod estimator;
pub mod field_layout;
pub mod landmarks;
pub mod std_devs;
pub mod trust;

pub use alliance_flip::AllianceFlip;
pub use estimator::{CandidatePose, EstimationStrategy, EstimatorConfig, PoseEstimator};
pub use field_layout::{FieldLayout, FieldTag};
pub use landmarks::LandmarkBands;
pub use std_devs::{StdDevHeuristic, StdDevState};
pub use trust::{RejectReason, TrustDecision, TrustFilter, TrustPolicy, TrustReport};
