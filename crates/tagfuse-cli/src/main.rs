//! `tagfuse` – vision pose-fusion command line interface
//!
//! This binary drives the fusion pipeline against recorded camera frames.  It:
//!
//! 1. Loads `~/.tagfuse/config.toml` (or `--config`), then applies
//!    `TAGFUSE_*` environment overrides and command-line flags.
//! 2. Loads the field layout and builds one replay camera per configured
//!    camera from a JSON-lines frames file.
//! 3. Binds configured driver buttons, replayed from the same file, to
//!    run-once commands.
//! 4. Runs the robot loop at the configured period, publishing diagnostics to
//!    a JSON-lines telemetry file or to the log.
//! 5. Intercepts **Ctrl-C** to stop the loop after the current tick and print
//!    a summary.

mod config;
mod replay;
mod sink;

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::warn;

use tagfuse_hal::{Diagnostics, FixedAlliance, SimDrivetrain, TracingDiagnostics};
use tagfuse_perception::{AllianceFlip, FieldLayout};
use tagfuse_runtime::{Robot, VisionSubsystem};
use tagfuse_types::{Alliance, VisionError};

use crate::config::Config;
use crate::replay::Replay;
use crate::sink::JsonLinesDiagnostics;

#[derive(Parser)]
#[command(name = "tagfuse", version, about = "AprilTag vision pose fusion")]
struct Cli {
    /// Config file (default: ~/.tagfuse/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay recorded frames through the fusion pipeline
    Run {
        /// JSON-lines file of recorded detection frames
        #[arg(long)]
        frames: PathBuf,
        /// Stop after this many ticks (default: until every frame is replayed)
        #[arg(long)]
        ticks: Option<u64>,
        /// Field layout JSON
        #[arg(long)]
        layout: Option<PathBuf>,
        /// blue, red or unknown
        #[arg(long)]
        alliance: Option<Alliance>,
        /// Loop period in milliseconds; 0 runs ticks back to back
        #[arg(long)]
        period_ms: Option<u64>,
        /// Write diagnostics to this JSON-lines file instead of the log
        #[arg(long)]
        telemetry: Option<PathBuf>,
    },
    /// Print the tags of a field layout
    Layout {
        #[arg(long)]
        layout: Option<PathBuf>,
        /// Only the reef landmark tags of both alliances
        #[arg(long)]
        reef_only: bool,
        /// Print the layout as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = tagfuse_runtime::init_tracing("tagfuse");

    let result = match cli.command {
        Command::Run {
            frames,
            ticks,
            layout,
            alliance,
            period_ms,
            telemetry,
        } => config::load(cli.config.as_deref()).and_then(|mut cfg| {
            if layout.is_some() {
                cfg.layout_path = layout;
            }
            if let Some(a) = alliance {
                cfg.alliance = a;
            }
            if let Some(ms) = period_ms {
                cfg.period_ms = ms;
            }
            if telemetry.is_some() {
                cfg.telemetry_path = telemetry;
            }
            run(&cfg, &frames, ticks)
        }),
        Command::Layout {
            layout,
            reef_only,
            json,
        } => config::load(cli.config.as_deref()).and_then(|mut cfg| {
            if layout.is_some() {
                cfg.layout_path = layout;
            }
            print_layout(&cfg, reef_only, json)
        }),
        Command::InitConfig { force } => init_config(cli.config.as_deref(), force),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// run
// ─────────────────────────────────────────────────────────────────────────────

fn run(cfg: &Config, frames: &Path, ticks: Option<u64>) -> Result<(), VisionError> {
    print_banner();

    let layout = Arc::new(FieldLayout::load(cfg.require_layout_path()?)?);
    let replay = Replay::load(frames)?;
    println!(
        "  Layout {} ({} tags), {} frame(s) from {}",
        cfg.require_layout_path()?.display().to_string().bold(),
        layout.len(),
        replay.len(),
        frames.display().to_string().bold()
    );

    let last_command_tick = cfg.commands.iter().map(|c| c.tick + 1).max().unwrap_or(0);
    let max_ticks = ticks.unwrap_or_else(|| replay.tick_span().max(last_command_tick));

    let start = AllianceFlip::from_layout(&layout).flip_pose2d(cfg.start_pose, cfg.alliance);
    let mut vision = VisionSubsystem::new(Arc::clone(&layout), cfg.vision.clone());
    let buttons: Vec<_> = cfg
        .bindings
        .iter()
        .map(|b| (b.button, replay.button(b.button), b.command))
        .collect();
    let cameras = replay.into_cameras(cfg.cameras.iter().map(|c| c.name.as_str()));
    for (camera, mount) in cameras.into_iter().zip(&cfg.cameras) {
        vision.add_camera(Box::new(camera), mount.robot_to_camera());
    }

    let tick = Rc::new(Cell::new(0u64));
    let diagnostics: Box<dyn Diagnostics> = match &cfg.telemetry_path {
        Some(path) => Box::new(JsonLinesDiagnostics::create(path, Rc::clone(&tick))?),
        None => Box::new(TracingDiagnostics),
    };

    let mut robot = Robot::new(
        vision,
        Box::new(SimDrivetrain::new(start)),
        Box::new(FixedAlliance::new(cfg.alliance)),
        diagnostics,
    );
    for scheduled in &cfg.commands {
        robot.schedule_at(scheduled.tick, scheduled.command);
    }
    for (button, track, command) in buttons {
        if track.is_empty() {
            warn!(button, "bound button never changes state in the replay");
        }
        let tick = Rc::clone(&tick);
        robot.bind(move || track.is_pressed(tick.get()), command);
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping after this tick …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the loop can only stop at its tick limit");
    }

    println!(
        "  Alliance {}, {} camera(s), {} tick(s) at {} ms\n",
        cfg.alliance.to_string().bold(),
        robot.vision().camera_names().len(),
        max_ticks,
        cfg.period_ms
    );

    let report = robot.run_with(cfg.period(), &shutdown, Some(max_ticks), |done, _| tick.set(done));
    let stats = robot.vision().stats();
    let pose = robot.drivetrain().pose();

    println!();
    println!("{}", "  Summary".bold().cyan());
    println!("    ticks          {} ({} overrun)", report.ticks, report.overruns);
    println!("    frames         {}", stats.frames);
    println!("    accepted       {}", stats.accepted.to_string().green());
    println!("    rejected       {}", stats.rejected.to_string().yellow());
    println!("    no estimate    {}", stats.no_estimate);
    if stats.out_of_order > 0 {
        println!("    out of order   {}", stats.out_of_order.to_string().yellow());
    }
    if stats.camera_faults > 0 {
        println!("    camera faults  {}", stats.camera_faults.to_string().red());
    }
    println!(
        "    final pose     x={:.3} y={:.3} heading={:.3} rad",
        pose.x, pose.y, pose.heading_rad
    );
    if let Some(target) = robot.vision().closest_landmark(pose, cfg.alliance) {
        println!(
            "    closest reef   x={:.3} y={:.3} heading={:.3} rad ({:.2} m)",
            target.x,
            target.y,
            target.heading_rad,
            pose.distance(target)
        );
    }
    if let Some(path) = &cfg.telemetry_path {
        println!("    telemetry      {}", path.display().to_string().bold());
    }
    println!();
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// layout
// ─────────────────────────────────────────────────────────────────────────────

fn print_layout(cfg: &Config, reef_only: bool, json: bool) -> Result<(), VisionError> {
    let mut layout = FieldLayout::load(cfg.require_layout_path()?)?;
    if reef_only {
        layout = layout.reef_only();
    }
    if json {
        println!("{}", layout.to_json_string()?);
        return Ok(());
    }

    println!(
        "  Field {:.3} m x {:.3} m, {} tag(s)",
        layout.field_length(),
        layout.field_width(),
        layout.len()
    );
    println!("  {}", format!("{:>4}  {:>8}  {:>8}  {:>6}  {:>8}", "id", "x", "y", "z", "yaw").dimmed());
    for tag in layout.tags() {
        let t = tag.pose.translation;
        println!(
            "  {:>4}  {:>8.3}  {:>8.3}  {:>6.3}  {:>8.3}",
            tag.id.to_string().bold(),
            t.x,
            t.y,
            t.z,
            tag.pose.rotation.yaw()
        );
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// init-config
// ─────────────────────────────────────────────────────────────────────────────

fn init_config(path: Option<&Path>, force: bool) -> Result<(), VisionError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config::config_path);
    if path.exists() && !force {
        return Err(VisionError::Config(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        )));
    }
    config::save_to(&Config::default(), &path)?;
    println!(
        "  {} Config saved to {}",
        "✓".green().bold(),
        path.display().to_string().bold()
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  _                __                "#.bold().cyan());
    println!("{}", r#" | |_ __ _ __ _   / _|_  _ ___ ___   "#.bold().cyan());
    println!("{}", r#" |  _/ _` / _` | |  _| || (_-</ -_)  "#.bold().cyan());
    println!("{}", r#"  \__\__,_\__, | |_|  \_,_/__/\___|  "#.bold().cyan());
    println!("{}", r#"          |___/                      "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "tagfuse".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  AprilTag vision pose fusion");
    println!();
}
