//! [`Robot`] – the periodic loop that drives the vision pipeline.
//!
//! Each tick:
//!
//! 1. **Bindings** – commands scheduled for this tick are queued, then every
//!    bound condition is polled; a rising edge queues its command once.
//! 2. **Commands** – queued [`RobotCommand`]s run exactly once, in the order
//!    they were requested.
//! 3. **Vision** – [`VisionSubsystem::periodic`] runs against the robot's
//!    collaborators.
//!
//! [`Robot::run`] repeats this at a fixed period until a shutdown flag is
//! raised or a tick limit is reached.  Ticks that take longer than the period
//! are logged as overruns and the next tick starts immediately.
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use tagfuse_hal::{FixedAlliance, NullDiagnostics, SimDrivetrain};
//! use tagfuse_perception::FieldLayout;
//! use tagfuse_runtime::robot::{Robot, RobotCommand};
//! use tagfuse_runtime::vision::{VisionConfig, VisionSubsystem};
//! use tagfuse_types::{Alliance, Pose2D};
//!
//! let layout = Arc::new(FieldLayout::new(Vec::new(), 17.548, 8.052));
//! let mut robot = Robot::new(
//!     VisionSubsystem::new(layout, VisionConfig::default()),
//!     Box::new(SimDrivetrain::new(Pose2D::default())),
//!     Box::new(FixedAlliance::new(Alliance::Blue)),
//!     Box::new(NullDiagnostics),
//! );
//! robot.schedule(RobotCommand::ResetPose(Pose2D::new(1.0, 2.0, 0.0)));
//!
//! let report = robot.run(Duration::ZERO, &AtomicBool::new(false), Some(3));
//! assert_eq!(report.ticks, 3);
//! assert_eq!(robot.drivetrain().pose().x, 1.0);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tagfuse_hal::{Diagnostics, DriverStation, Drivetrain};
use tagfuse_types::Pose2D;
use tracing::{debug, debug_span, info, warn};

use crate::trigger::EdgeTrigger;
use crate::vision::{TickSummary, VisionSubsystem};

/// Default loop period.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(20);

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// A run-once action on the robot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RobotCommand {
    DisableVision,
    EnableVision,
    /// Overwrite the drivetrain's pose estimate.
    ResetPose(Pose2D),
}

impl fmt::Display for RobotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RobotCommand::DisableVision => write!(f, "disable vision"),
            RobotCommand::EnableVision => write!(f, "enable vision"),
            RobotCommand::ResetPose(p) => {
                write!(f, "reset pose to ({:.2}, {:.2}, {:.2} rad)", p.x, p.y, p.heading_rad)
            }
        }
    }
}

struct Binding {
    condition: Box<dyn FnMut() -> bool>,
    trigger: EdgeTrigger,
    command: RobotCommand,
}

// ─────────────────────────────────────────────────────────────────────────────
// Robot
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of [`Robot::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunReport {
    pub ticks: u64,
    /// Ticks that took longer than the period.
    pub overruns: u64,
}

/// Owns the vision subsystem and every collaborator it talks to.
pub struct Robot {
    vision: VisionSubsystem,
    drivetrain: Box<dyn Drivetrain>,
    driver_station: Box<dyn DriverStation>,
    diagnostics: Box<dyn Diagnostics>,
    queue: VecDeque<RobotCommand>,
    /// `(tick, command)` sorted by tick, ties in scheduling order.
    timed: VecDeque<(u64, RobotCommand)>,
    bindings: Vec<Binding>,
    ticks: u64,
}

impl Robot {
    pub fn new(
        vision: VisionSubsystem,
        drivetrain: Box<dyn Drivetrain>,
        driver_station: Box<dyn DriverStation>,
        diagnostics: Box<dyn Diagnostics>,
    ) -> Self {
        Self {
            vision,
            drivetrain,
            driver_station,
            diagnostics,
            queue: VecDeque::new(),
            timed: VecDeque::new(),
            bindings: Vec::new(),
            ticks: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn vision(&self) -> &VisionSubsystem {
        &self.vision
    }

    pub fn vision_mut(&mut self) -> &mut VisionSubsystem {
        &mut self.vision
    }

    pub fn drivetrain(&self) -> &dyn Drivetrain {
        self.drivetrain.as_ref()
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Commands not yet run, including those scheduled for a later tick.
    pub fn pending_commands(&self) -> usize {
        self.queue.len() + self.timed.len()
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Queue `command` to run once at the start of the next tick.
    pub fn schedule(&mut self, command: RobotCommand) {
        debug!(%command, "command scheduled");
        self.queue.push_back(command);
    }

    /// Queue `command` at the start of tick `tick` (0-based).  A tick that
    /// has already passed runs it on the next tick.
    pub fn schedule_at(&mut self, tick: u64, command: RobotCommand) {
        debug!(%command, tick, "command scheduled");
        let pos = self.timed.iter().position(|(t, _)| *t > tick).unwrap_or(self.timed.len());
        self.timed.insert(pos, (tick, command));
    }

    /// Queue `command` every time `condition` goes from false to true.
    pub fn bind(&mut self, condition: impl FnMut() -> bool + 'static, command: RobotCommand) {
        self.bindings.push(Binding {
            condition: Box::new(condition),
            trigger: EdgeTrigger::new(),
            command,
        });
    }

    fn execute(&mut self, command: RobotCommand) {
        info!(%command, tick = self.ticks, "running command");
        match command {
            RobotCommand::DisableVision => self.vision.set_disabled(true),
            RobotCommand::EnableVision => self.vision.set_disabled(false),
            RobotCommand::ResetPose(pose) => self.drivetrain.reset_pose(pose),
        }
    }

    // -------------------------------------------------------------------------
    // Loop
    // -------------------------------------------------------------------------

    /// Run one tick.
    pub fn tick(&mut self) -> TickSummary {
        let span = debug_span!("tick", n = self.ticks);
        let _entered = span.enter();

        while self.timed.front().is_some_and(|(t, _)| *t <= self.ticks) {
            if let Some((_, command)) = self.timed.pop_front() {
                self.queue.push_back(command);
            }
        }
        for binding in &mut self.bindings {
            if binding.trigger.update((binding.condition)()) {
                self.queue.push_back(binding.command);
            }
        }
        while let Some(command) = self.queue.pop_front() {
            self.execute(command);
        }

        let summary = self.vision.periodic(
            self.drivetrain.as_mut(),
            self.driver_station.as_ref(),
            self.diagnostics.as_mut(),
        );
        self.ticks += 1;
        summary
    }

    /// Tick every `period` until `shutdown` is set or `max_ticks` ticks have
    /// run.  A zero period runs ticks back to back.
    pub fn run(&mut self, period: Duration, shutdown: &AtomicBool, max_ticks: Option<u64>) -> RunReport {
        self.run_with(period, shutdown, max_ticks, |_, _| {})
    }

    /// [`Robot::run`], calling `on_tick` with the completed tick count and
    /// that tick's summary after every tick.
    pub fn run_with(
        &mut self,
        period: Duration,
        shutdown: &AtomicBool,
        max_ticks: Option<u64>,
        mut on_tick: impl FnMut(u64, &TickSummary),
    ) -> RunReport {
        info!(period_ms = period.as_millis() as u64, ?max_ticks, "robot loop starting");
        let mut report = RunReport::default();

        while !shutdown.load(Ordering::Relaxed) {
            if max_ticks.is_some_and(|max| report.ticks >= max) {
                break;
            }
            let started = Instant::now();
            let summary = self.tick();
            report.ticks += 1;
            on_tick(self.ticks, &summary);

            let elapsed = started.elapsed();
            if elapsed > period && !period.is_zero() {
                report.overruns += 1;
                warn!(
                    elapsed_ms = elapsed.as_secs_f64() * 1e3,
                    period_ms = period.as_secs_f64() * 1e3,
                    "loop overrun"
                );
            } else if let Some(remaining) = period.checked_sub(elapsed) {
                thread::sleep(remaining);
            }
        }

        info!(ticks = report.ticks, overruns = report.overruns, "robot loop stopped");
        report
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
