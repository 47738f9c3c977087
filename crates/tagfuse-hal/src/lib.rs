//! `tagfuse-hal` – the robot's collaborators, seen from the vision pipeline.
//!
//! Every piece of hardware or vendor software the pipeline talks to is
//! reached through a trait defined here, so the pipeline can run against real
//! drivers on the robot and against the [`sim`] stand-ins everywhere else.
//!
//! # Modules
//!
//! - [`camera`] – [`Camera`][camera::Camera] plus the
//!   [`DetectionFrame`][camera::DetectionFrame] / [`TagDetection`][camera::TagDetection]
//!   data a camera coprocessor produces.
//! - [`drivetrain`] – [`Drivetrain`][drivetrain::Drivetrain]: the pose-fusion sink.
//! - [`driver_station`] – [`DriverStation`][driver_station::DriverStation]: alliance colour.
//! - [`diagnostics`] – [`Diagnostics`][diagnostics::Diagnostics]: fire-and-forget
//!   key/value telemetry.
//! - [`sim`] – replay camera, simulated drivetrain, fixed alliance.

pub mod camera;
pub mod diagnostics;
pub mod driver_station;
pub mod drivetrain;
pub mod sim;

pub use camera::{Camera, DetectionFrame, MultiTagResult, TagDetection};
pub use diagnostics::{
    DiagnosticValue, Diagnostics, NullDiagnostics, RecordingDiagnostics, TracingDiagnostics,
};
pub use driver_station::DriverStation;
pub use drivetrain::Drivetrain;
pub use sim::{FixedAlliance, ReplayCamera, SimDrivetrain, VisionMeasurement};
