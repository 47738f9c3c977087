//! `tagfuse-runtime` – the tick-driven robot loop around the vision pipeline.
//!
//! # Modules
//!
//! - [`vision`] – [`VisionSubsystem`][vision::VisionSubsystem]: drains every
//!   camera, estimates, filters and fuses poses, and publishes diagnostics.
//! - [`robot`] – [`Robot`][robot::Robot]: owns the subsystem and its
//!   collaborators, runs [`RobotCommand`][robot::RobotCommand]s once each and
//!   ticks at a fixed period.
//! - [`trigger`] – [`EdgeTrigger`][trigger::EdgeTrigger]: rising-edge
//!   detection for command bindings.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter.  Set
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` to export the per-tick spans to any
//!   OTLP-compatible collector.

pub mod robot;
pub mod telemetry;
pub mod trigger;
pub mod vision;

pub use robot::{DEFAULT_PERIOD, Robot, RobotCommand, RunReport};
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use trigger::EdgeTrigger;
pub use vision::{TickSummary, VisionConfig, VisionStats, VisionSubsystem};
