//! In-process stand-ins for the robot's collaborators.
//!
//! These let the full vision pipeline run in unit tests, CI and the replay
//! CLI without a robot, a camera coprocessor or a field management system.
//!
//! | Stand-in | Behaviour |
//! |---|---|
//! | [`ReplayCamera`] | Releases scripted [`DetectionFrame`]s tick by tick; can be disconnected or made to fault. |
//! | [`SimDrivetrain`] | Blends vision measurements into its pose with a per-axis steady-state Kalman gain and records every measurement. |
//! | [`FixedAlliance`] | Returns a settable alliance; clones share the value. |
//!
//! # Example
//!
//! ```rust
//! use tagfuse_hal::drivetrain::Drivetrain;
//! use tagfuse_hal::sim::SimDrivetrain;
//! use tagfuse_types::{Pose2D, StdDevs};
//!
//! let mut drive = SimDrivetrain::new(Pose2D::new(0.0, 0.0, 0.0));
//! drive.add_vision_measurement(Pose2D::new(1.0, 0.0, 0.0), 0.02, StdDevs::uniform(0.1));
//! assert!(drive.pose().x > 0.0 && drive.pose().x < 1.0);
//! ```

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use tagfuse_types::geometry::normalize_angle;
use tagfuse_types::{Alliance, Pose2D, StdDevs, VisionError};
use tracing::debug;

use crate::camera::{Camera, DetectionFrame};
use crate::driver_station::DriverStation;
use crate::drivetrain::Drivetrain;

// ────────────────────────────────────────────────────────────────────────────
// Replay camera
// ────────────────────────────────────────────────────────────────────────────

/// A camera that replays a script of frames.
///
/// Every call to [`Camera::unread_results`] counts as one tick: the `n`-th call
/// (starting at 0) returns every scripted frame whose release tick is `≤ n`
/// that has not been returned yet, in script order.
pub struct ReplayCamera {
    name: String,
    connected: bool,
    fail_next_read: bool,
    reads: u64,
    script: VecDeque<(u64, DetectionFrame)>,
}

impl ReplayCamera {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connected: true,
            fail_next_read: false,
            reads: 0,
            script: VecDeque::new(),
        }
    }

    /// Schedule `frame` for release on `tick`.  Frames scheduled for the same
    /// tick are released in the order they were added.
    pub fn schedule(&mut self, tick: u64, frame: DetectionFrame) {
        let pos = self.script.iter().position(|(t, _)| *t > tick).unwrap_or(self.script.len());
        self.script.insert(pos, (tick, frame));
    }

    /// Builder form of [`ReplayCamera::schedule`].
    pub fn with_frame(mut self, tick: u64, frame: DetectionFrame) -> Self {
        self.schedule(tick, frame);
        self
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Make the next read fail with [`VisionError::CameraFault`].  The read
    /// still consumes a tick but releases no frames.
    pub fn fail_next_read(&mut self) {
        self.fail_next_read = true;
    }

    /// Frames still waiting in the script.
    pub fn pending(&self) -> usize {
        self.script.len()
    }
}

impl Camera for ReplayCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn unread_results(&mut self) -> Result<Vec<DetectionFrame>, VisionError> {
        let now = self.reads;
        self.reads += 1;

        if std::mem::take(&mut self.fail_next_read) {
            return Err(VisionError::CameraFault {
                camera: self.name.clone(),
                details: "simulated result-queue fault".to_string(),
            });
        }

        let mut released = Vec::new();
        while self.script.front().is_some_and(|(tick, _)| *tick <= now) {
            if let Some((_, frame)) = self.script.pop_front() {
                released.push(frame);
            }
        }
        Ok(released)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated drivetrain
// ────────────────────────────────────────────────────────────────────────────

/// A vision measurement as received by [`SimDrivetrain`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionMeasurement {
    pub pose: Pose2D,
    pub timestamp: f64,
    pub std_devs: StdDevs,
}

/// Pose-fusion sink with a constant-gain blend per axis.
///
/// With state standard deviation `q` and measurement standard deviation `r`
/// the estimate moves toward the measurement by `q² / (q² + r²)` of the
/// error.  Infinite `r` leaves the estimate untouched.
///
/// Only the most recent [`SimDrivetrain::DEFAULT_HISTORY`] measurements are
/// kept for inspection.
#[derive(Debug)]
pub struct SimDrivetrain {
    pose: Pose2D,
    state_std_devs: StdDevs,
    measurements: VecDeque<VisionMeasurement>,
    history: usize,
    received: u64,
    latest_timestamp: Option<f64>,
    out_of_order: u64,
}

impl SimDrivetrain {
    /// Default state standard deviations: 0.1 m on x/y, 0.1 rad on heading.
    pub const DEFAULT_STATE_STD_DEVS: StdDevs = StdDevs::uniform(0.1);
    /// Measurements retained by [`SimDrivetrain::measurements`].
    pub const DEFAULT_HISTORY: usize = 512;

    pub fn new(initial: Pose2D) -> Self {
        Self::with_state_std_devs(initial, Self::DEFAULT_STATE_STD_DEVS)
    }

    pub fn with_state_std_devs(initial: Pose2D, state_std_devs: StdDevs) -> Self {
        Self {
            pose: initial,
            state_std_devs,
            measurements: VecDeque::new(),
            history: Self::DEFAULT_HISTORY,
            received: 0,
            latest_timestamp: None,
            out_of_order: 0,
        }
    }

    /// Keep at most `history` measurements; older ones are dropped first.
    pub fn with_history(mut self, history: usize) -> Self {
        self.history = history;
        while self.measurements.len() > history {
            self.measurements.pop_front();
        }
        self
    }

    /// The most recent measurements, oldest first.
    pub fn measurements(&self) -> &VecDeque<VisionMeasurement> {
        &self.measurements
    }

    /// Measurements received since construction, including dropped ones.
    pub fn received_count(&self) -> u64 {
        self.received
    }

    /// Measurements that arrived with a timestamp older than one already
    /// applied.
    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order
    }
}

fn blend_gain(q: f64, r: f64) -> f64 {
    let (q2, r2) = (q * q, r * r);
    if q2 == 0.0 || !r2.is_finite() {
        return 0.0;
    }
    if !q2.is_finite() {
        return 1.0;
    }
    q2 / (q2 + r2)
}

impl Drivetrain for SimDrivetrain {
    fn pose(&self) -> Pose2D {
        self.pose
    }

    fn add_vision_measurement(&mut self, pose: Pose2D, timestamp: f64, std_devs: StdDevs) {
        match self.latest_timestamp {
            Some(latest) if timestamp < latest => {
                self.out_of_order += 1;
                debug!(timestamp, latest, "vision measurement older than the latest applied");
            }
            _ => self.latest_timestamp = Some(timestamp),
        }

        let kx = blend_gain(self.state_std_devs.x, std_devs.x);
        let ky = blend_gain(self.state_std_devs.y, std_devs.y);
        let kh = blend_gain(self.state_std_devs.heading, std_devs.heading);

        let heading_err = normalize_angle(pose.heading_rad - self.pose.heading_rad);
        self.pose = Pose2D::new(
            self.pose.x + kx * (pose.x - self.pose.x),
            self.pose.y + ky * (pose.y - self.pose.y),
            normalize_angle(self.pose.heading_rad + kh * heading_err),
        );

        self.received += 1;
        if self.history == 0 {
            return;
        }
        if self.measurements.len() == self.history {
            self.measurements.pop_front();
        }
        self.measurements.push_back(VisionMeasurement {
            pose,
            timestamp,
            std_devs,
        });
    }

    fn reset_pose(&mut self, pose: Pose2D) {
        self.pose = pose;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Fixed alliance
// ────────────────────────────────────────────────────────────────────────────

/// A driver station whose alliance is set by the caller.
#[derive(Debug, Clone, Default)]
pub struct FixedAlliance(Rc<Cell<Alliance>>);

impl FixedAlliance {
    pub fn new(alliance: Alliance) -> Self {
        Self(Rc::new(Cell::new(alliance)))
    }

    pub fn set(&self, alliance: Alliance) {
        self.0.set(alliance);
    }
}

impl DriverStation for FixedAlliance {
    fn alliance(&self) -> Alliance {
        self.0.get()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ts: f64) -> DetectionFrame {
        DetectionFrame {
            timestamp: ts,
            ..DetectionFrame::default()
        }
    }

    #[test]
    fn replay_releases_frames_by_tick() {
        let mut cam = ReplayCamera::new("cam")
            .with_frame(0, frame(0.0))
            .with_frame(2, frame(0.04))
            .with_frame(2, frame(0.05));

        assert_eq!(cam.unread_results().unwrap().len(), 1); // tick 0
        assert!(cam.unread_results().unwrap().is_empty()); // tick 1
        let backlog = cam.unread_results().unwrap(); // tick 2
        assert_eq!(backlog.len(), 2);
        assert_eq!(backlog[0].timestamp, 0.04);
        assert_eq!(backlog[1].timestamp, 0.05);
        assert_eq!(cam.pending(), 0);
    }

    #[test]
    fn replay_schedule_keeps_tick_order() {
        let mut cam = ReplayCamera::new("cam");
        cam.schedule(3, frame(3.0));
        cam.schedule(1, frame(1.0));
        cam.schedule(1, frame(1.5));
        let all: Vec<f64> = (0..4)
            .flat_map(|_| cam.unread_results().unwrap())
            .map(|f| f.timestamp)
            .collect();
        assert_eq!(all, vec![1.0, 1.5, 3.0]);
    }

    #[test]
    fn replay_fault_consumes_one_read() {
        let mut cam = ReplayCamera::new("cam").with_frame(0, frame(0.0));
        cam.fail_next_read();
        assert!(matches!(
            cam.unread_results(),
            Err(VisionError::CameraFault { .. })
        ));
        assert_eq!(cam.unread_results().unwrap().len(), 1);
    }

    #[test]
    fn replay_connection_flag() {
        let mut cam = ReplayCamera::new("cam");
        assert!(cam.is_connected());
        cam.set_connected(false);
        assert!(!cam.is_connected());
    }

    #[test]
    fn equal_std_devs_move_halfway() {
        let mut drive = SimDrivetrain::new(Pose2D::new(0.0, 0.0, 0.0));
        drive.add_vision_measurement(Pose2D::new(2.0, -2.0, 0.4), 1.0, StdDevs::uniform(0.1));
        let p = drive.pose();
        assert!((p.x - 1.0).abs() < 1e-9);
        assert!((p.y + 1.0).abs() < 1e-9);
        assert!((p.heading_rad - 0.2).abs() < 1e-9);
    }

    #[test]
    fn infinite_std_devs_leave_pose_untouched() {
        let start = Pose2D::new(1.0, 1.0, 0.0);
        let mut drive = SimDrivetrain::new(start);
        drive.add_vision_measurement(Pose2D::new(5.0, 5.0, 1.0), 1.0, StdDevs::infinite());
        assert_eq!(drive.pose(), start);
        assert_eq!(drive.measurements().len(), 1);
    }

    #[test]
    fn heading_blend_takes_short_way_round() {
        let mut drive = SimDrivetrain::new(Pose2D::new(0.0, 0.0, 3.0));
        drive.add_vision_measurement(Pose2D::new(0.0, 0.0, -3.0), 0.0, StdDevs::uniform(0.1));
        // Error is +0.283 rad across the ±π seam, so the heading grows past π
        // and wraps negative.
        let h = drive.pose().heading_rad;
        assert!(h.abs() > 3.0, "heading {h} should stay near ±π");
    }

    #[test]
    fn out_of_order_measurements_are_counted_not_fatal() {
        let mut drive = SimDrivetrain::new(Pose2D::default());
        drive.add_vision_measurement(Pose2D::new(1.0, 0.0, 0.0), 2.0, StdDevs::uniform(0.1));
        drive.add_vision_measurement(Pose2D::new(1.0, 0.0, 0.0), 1.0, StdDevs::uniform(0.1));
        drive.add_vision_measurement(Pose2D::new(1.0, 0.0, 0.0), 3.0, StdDevs::uniform(0.1));
        assert_eq!(drive.out_of_order_count(), 1);
        assert_eq!(drive.measurements().len(), 3);
        assert!(drive.pose().x > 0.8);
    }

    #[test]
    fn measurement_history_is_capped() {
        let mut drive = SimDrivetrain::new(Pose2D::default()).with_history(2);
        for t in [1.0, 2.0, 3.0] {
            drive.add_vision_measurement(Pose2D::new(1.0, 0.0, 0.0), t, StdDevs::uniform(0.1));
        }
        let kept: Vec<f64> = drive.measurements().iter().map(|m| m.timestamp).collect();
        assert_eq!(kept, vec![2.0, 3.0]);
        assert_eq!(drive.received_count(), 3);

        let mut silent = SimDrivetrain::new(Pose2D::default()).with_history(0);
        silent.add_vision_measurement(Pose2D::new(1.0, 0.0, 0.0), 1.0, StdDevs::uniform(0.1));
        assert!(silent.measurements().is_empty());
        assert!(silent.pose().x > 0.4);
    }

    #[test]
    fn reset_pose_overwrites_estimate() {
        let mut drive = SimDrivetrain::new(Pose2D::default());
        drive.reset_pose(Pose2D::new(4.0, 2.0, 1.0));
        assert_eq!(drive.pose(), Pose2D::new(4.0, 2.0, 1.0));
    }

    #[test]
    fn fixed_alliance_clones_share_value() {
        let ds = FixedAlliance::new(Alliance::Unknown);
        let handle = ds.clone();
        handle.set(Alliance::Red);
        assert_eq!(ds.alliance(), Alliance::Red);
    }
}
