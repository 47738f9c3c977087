//! [`VisionSubsystem`] – per-tick vision orchestration.
//!
//! Each call to [`VisionSubsystem::periodic`]:
//!
//! 1. **Drain** – every connected camera's unread frames are read in arrival
//!    order.  A disconnected or faulting camera contributes nothing this tick;
//!    the other cameras carry on.
//! 2. **Estimate** – each frame goes through that camera's
//!    [`PoseEstimator`], yielding at most one [`CandidatePose`].
//! 3. **Filter** – the [`TrustFilter`] decides on the candidate using the
//!    alliance as reported right now.
//! 4. **Fuse** – accepted candidates are handed to the [`Drivetrain`].
//! 5. **Report** – per-camera tables, trust figures and the closest landmark
//!    are published to [`Diagnostics`].
//!
//! While vision is disabled steps 1–4 are skipped; the closest-landmark
//! diagnostics still publish.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tagfuse_hal::{Camera, DetectionFrame, Diagnostics, DriverStation, Drivetrain, TagDetection};
use tagfuse_perception::{
    CandidatePose, EstimatorConfig, FieldLayout, PoseEstimator, StdDevHeuristic, StdDevState,
    TrustDecision, TrustFilter, TrustPolicy,
};
use tagfuse_types::{Alliance, Pose2D, StdDevs, Transform3D};
use tracing::{debug, info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for [`VisionSubsystem`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub trust: TrustPolicy,
    pub std_devs: StdDevHeuristic,
    pub estimator: EstimatorConfig,
    /// Run the distance heuristic for every candidate and keep the result in
    /// [`VisionSubsystem::estimation_std_devs`].
    pub recompute_std_devs: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Counters
// ─────────────────────────────────────────────────────────────────────────────

/// What one [`VisionSubsystem::periodic`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TickSummary {
    pub frames: u64,
    pub accepted: u64,
    pub rejected: u64,
}

/// Running totals since construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VisionStats {
    pub frames: u64,
    /// Frames from which no pose could be estimated.
    pub no_estimate: u64,
    pub accepted: u64,
    pub rejected: u64,
    /// Accepted measurements older than the previous accepted one from the
    /// same camera.  They are still forwarded.
    pub out_of_order: u64,
    pub camera_faults: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// VisionSubsystem
// ─────────────────────────────────────────────────────────────────────────────

struct VisionCamera {
    camera: Box<dyn Camera>,
    estimator: PoseEstimator,
    last_accepted: Option<f64>,
}

/// Fuses fiducial detections from every camera into the drivetrain's pose.
pub struct VisionSubsystem {
    layout: Arc<FieldLayout>,
    config: VisionConfig,
    trust: TrustFilter,
    cameras: Vec<VisionCamera>,
    std_devs: StdDevState,
    disabled: bool,
    all_detected_targets: Vec<TagDetection>,
    stats: VisionStats,
}

impl VisionSubsystem {
    pub fn new(layout: Arc<FieldLayout>, config: VisionConfig) -> Self {
        info!(
            tags = layout.len(),
            recompute_std_devs = config.recompute_std_devs,
            "vision subsystem created"
        );
        Self {
            layout,
            trust: TrustFilter::new(config.trust.clone()),
            std_devs: StdDevState::new(config.std_devs.single_tag),
            config,
            cameras: Vec::new(),
            disabled: false,
            all_detected_targets: Vec::new(),
            stats: VisionStats::default(),
        }
    }

    /// Register a camera mounted at `robot_to_camera`.  Cameras are processed
    /// in registration order.
    pub fn add_camera(&mut self, camera: Box<dyn Camera>, robot_to_camera: Transform3D) {
        info!(camera = camera.name(), "camera registered");
        let estimator =
            PoseEstimator::with_config(Arc::clone(&self.layout), robot_to_camera, self.config.estimator);
        self.cameras.push(VisionCamera {
            camera,
            estimator,
            last_accepted: None,
        });
    }

    /// Builder form of [`VisionSubsystem::add_camera`].
    pub fn with_camera(mut self, camera: Box<dyn Camera>, robot_to_camera: Transform3D) -> Self {
        self.add_camera(camera, robot_to_camera);
        self
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    pub fn camera_names(&self) -> Vec<&str> {
        self.cameras.iter().map(|c| c.camera.name()).collect()
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        if disabled != self.disabled {
            info!(disabled, "vision processing toggled");
        }
        self.disabled = disabled;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Std-devs from the most recent heuristic recalculation.  Stays at the
    /// single-tag baseline unless `recompute_std_devs` is enabled.
    pub fn estimation_std_devs(&self) -> StdDevs {
        self.std_devs.current()
    }

    /// Every detection seen during the latest enabled tick, across cameras.
    pub fn all_detected_targets(&self) -> &[TagDetection] {
        &self.all_detected_targets
    }

    pub fn stats(&self) -> VisionStats {
        self.stats
    }

    /// The landmark of `alliance` nearest to `pose`.
    pub fn closest_landmark(&self, pose: Pose2D, alliance: Alliance) -> Option<Pose2D> {
        self.trust.policy().landmarks.nearest_landmark(pose, alliance, &self.layout)
    }

    // -------------------------------------------------------------------------
    // Periodic step
    // -------------------------------------------------------------------------

    /// Run one vision tick.
    pub fn periodic(
        &mut self,
        drivetrain: &mut dyn Drivetrain,
        driver_station: &dyn DriverStation,
        diagnostics: &mut dyn Diagnostics,
    ) -> TickSummary {
        let mut summary = TickSummary::default();

        if !self.disabled {
            self.all_detected_targets.clear();
            for index in 0..self.cameras.len() {
                let Some(frames) = self.read_camera(index, diagnostics) else {
                    continue;
                };
                for frame in &frames {
                    self.process_frame(index, frame, drivetrain, driver_station, diagnostics, &mut summary);
                }
            }
        }

        self.publish_landmarks(drivetrain.pose(), driver_station.alliance(), diagnostics);
        summary
    }

    fn read_camera(&mut self, index: usize, diagnostics: &mut dyn Diagnostics) -> Option<Vec<DetectionFrame>> {
        let camera = &mut self.cameras[index].camera;
        let connected = camera.is_connected();
        diagnostics.put_boolean(&format!("Cameras/{}/connected", camera.name()), connected);
        if !connected {
            debug!(camera = camera.name(), "camera disconnected; skipping");
            return None;
        }
        match camera.unread_results() {
            Ok(frames) => Some(frames),
            Err(e) => {
                warn!(camera = camera.name(), error = %e, "camera read failed; no measurements this tick");
                self.stats.camera_faults += 1;
                None
            }
        }
    }

    fn process_frame(
        &mut self,
        index: usize,
        frame: &DetectionFrame,
        drivetrain: &mut dyn Drivetrain,
        driver_station: &dyn DriverStation,
        diagnostics: &mut dyn Diagnostics,
        summary: &mut TickSummary,
    ) {
        self.stats.frames += 1;
        summary.frames += 1;
        self.all_detected_targets.extend(frame.detections.iter().cloned());

        let cam = &self.cameras[index];
        let name = cam.camera.name().to_string();
        let candidate = cam.estimator.estimate(frame);
        publish_camera_table(&name, frame, candidate.as_ref(), diagnostics);

        let Some(candidate) = candidate else {
            debug!(camera = %name, timestamp = frame.timestamp, "no pose estimate for frame");
            self.stats.no_estimate += 1;
            return;
        };

        if self.config.recompute_std_devs {
            self.std_devs.update(&self.config.std_devs, Some(&candidate), &self.layout);
        }

        let report = self.trust.decide(&candidate, driver_station.alliance());
        if let Some(distance) = report.distance {
            diagnostics.put_number(&format!("Vision/stdDev/{name}"), report.telemetry_std_dev());
            diagnostics.put_number(&format!("Vision/tagCount/{name}"), report.tag_count as f64);
            diagnostics.put_number(&format!("Vision/DistanceToTarget/{name}"), distance);
        }

        match report.decision {
            TrustDecision::Accept(std_devs) => {
                self.note_accepted_timestamp(index, &name, candidate.timestamp);
                let pose = candidate.pose2d();
                drivetrain.add_vision_measurement(pose, candidate.timestamp, std_devs);
                diagnostics.put_number_array("Vision/ElevatorCameraPoseEstimate", &pose.to_array());
                debug!(
                    camera = %name,
                    timestamp = candidate.timestamp,
                    std_dev = std_devs.x,
                    "vision measurement fused"
                );
                self.stats.accepted += 1;
                summary.accepted += 1;
            }
            TrustDecision::Reject(reason) => {
                debug!(camera = %name, timestamp = candidate.timestamp, %reason, "vision measurement rejected");
                self.stats.rejected += 1;
                summary.rejected += 1;
            }
        }
    }

    fn note_accepted_timestamp(&mut self, index: usize, name: &str, timestamp: f64) {
        let cam = &mut self.cameras[index];
        match cam.last_accepted {
            Some(last) if timestamp < last => {
                warn!(camera = name, timestamp, last, "vision measurement out of order");
                self.stats.out_of_order += 1;
            }
            _ => cam.last_accepted = Some(timestamp),
        }
    }

    fn publish_landmarks(&self, pose: Pose2D, alliance: Alliance, diagnostics: &mut dyn Diagnostics) {
        let landmarks = self.trust.policy().landmarks.landmark_poses(alliance, &self.layout);
        for (id, landmark) in &landmarks {
            diagnostics.put_number_array(&format!("Vision/Poses{id}"), &landmark.to_array());
        }
        let poses: Vec<Pose2D> = landmarks.into_iter().map(|(_, p)| p).collect();
        if let Some(closest) = pose.nearest(&poses) {
            diagnostics.put_number_array("Vision/ClosestAprilTag", &closest.to_array());
        }
    }
}

fn publish_camera_table(
    name: &str,
    frame: &DetectionFrame,
    candidate: Option<&CandidatePose>,
    diagnostics: &mut dyn Diagnostics,
) {
    if let Some(candidate) = candidate {
        diagnostics.put_number_array(
            &format!("Cameras/{name}/estimated pose"),
            &candidate.pose2d().to_array(),
        );
    }
    diagnostics.put_boolean(&format!("Cameras/{name}/has target"), frame.has_targets());
    if let Some(best) = frame.detections.first() {
        let ids: Vec<f64> = frame.fiducial_ids().into_iter().map(f64::from).collect();
        diagnostics.put_number_array(&format!("Cameras/{name}/ids"), &ids);
        diagnostics.put_number(
            &format!("Cameras/{name}/distance to closest target"),
            best.planar_distance(),
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
