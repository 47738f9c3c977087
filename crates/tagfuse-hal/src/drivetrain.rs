//! The pose-fusion sink the vision pipeline feeds.

use tagfuse_types::{Pose2D, StdDevs};

/// A drivetrain that maintains a fused pose estimate.
///
/// Odometry updates happen inside the implementation; vision only reads the
/// current estimate and offers timestamped corrections.
pub trait Drivetrain {
    /// Best current estimate of the robot pose in field coordinates.
    fn pose(&self) -> Pose2D;

    /// Fold a vision measurement taken at `timestamp` (seconds) into the
    /// estimate, weighted by `std_devs`.
    ///
    /// Implementations must tolerate timestamps older than previously
    /// accepted measurements.
    fn add_vision_measurement(&mut self, pose: Pose2D, timestamp: f64, std_devs: StdDevs);

    /// Overwrite the estimate, e.g. at the start of a match.
    fn reset_pose(&mut self, pose: Pose2D);
}
