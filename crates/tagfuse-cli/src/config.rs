//! Configuration vault – reads/writes `~/.tagfuse/config.toml`.
//!
//! ```toml
//! layout_path = "demos/field.json"
//! alliance = "blue"
//! period_ms = 20
//! start_pose = { x = 7.2, y = 4.0, heading_rad = 3.1416 }
//! telemetry_path = "telemetry.jsonl"
//!
//! [[cameras]]
//! name = "Front_Left_Swerve"
//! x = 0.27
//! y = 0.27
//! z = 0.32
//! yaw = 0.7854
//!
//! [vision]
//! recompute_std_devs = false
//!
//! [vision.trust]
//! trusted_distance = 1.5
//!
//! [[commands]]
//! tick = 100
//! command = { type = "disable_vision" }
//!
//! [[bindings]]
//! button = 1
//! command = { type = "enable_vision" }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tagfuse_runtime::{RobotCommand, VisionConfig};
use tagfuse_types::{Alliance, Pose2D, Quaternion, Transform3D, Vec3, VisionError};

/// A camera and where it is mounted on the robot.  Distances in metres,
/// angles in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub name: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub roll: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub yaw: f64,
}

impl CameraConfig {
    pub fn robot_to_camera(&self) -> Transform3D {
        Transform3D::new(
            Vec3::new(self.x, self.y, self.z),
            Quaternion::from_euler(self.roll, self.pitch, self.yaw),
        )
    }
}

/// A command queued on a given tick of a replay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledCommand {
    pub tick: u64,
    pub command: RobotCommand,
}

/// A command run once each time a replayed driver button is pressed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ButtonBinding {
    pub button: u32,
    pub command: RobotCommand,
}

/// Persisted configuration stored in `~/.tagfuse/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// AprilTag layout JSON.  Required to run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_path: Option<PathBuf>,

    /// Alliance reported by the simulated driver station.
    pub alliance: Alliance,

    /// Robot loop period in milliseconds; 0 replays as fast as possible.
    pub period_ms: u64,

    /// Start pose from the blue alliance's perspective.  Flipped through the
    /// field centre when playing red.
    pub start_pose: Pose2D,

    pub cameras: Vec<CameraConfig>,

    pub vision: VisionConfig,

    /// Where to write published diagnostics as JSON lines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry_path: Option<PathBuf>,

    pub commands: Vec<ScheduledCommand>,

    pub bindings: Vec<ButtonBinding>,
}

fn default_cameras() -> Vec<CameraConfig> {
    use std::f64::consts::{FRAC_PI_4, PI};
    let camera = |name: &str, x: f64, y: f64, yaw: f64| CameraConfig {
        name: name.to_string(),
        x,
        y,
        z: 0.32,
        roll: 0.0,
        pitch: 0.0,
        yaw,
    };
    vec![
        camera("Front_Left_Swerve", 0.27, 0.27, FRAC_PI_4),
        camera("Front_Right_Swerve", 0.27, -0.27, -FRAC_PI_4),
        camera("Back_Left_Swerve", -0.27, 0.27, PI - FRAC_PI_4),
        camera("Back_Right_Swerve", -0.27, -0.27, -PI + FRAC_PI_4),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layout_path: None,
            alliance: Alliance::Blue,
            period_ms: 20,
            start_pose: Pose2D::new(7.2, 4.0, std::f64::consts::PI),
            cameras: default_cameras(),
            vision: VisionConfig::default(),
            telemetry_path: None,
            commands: Vec::new(),
            bindings: Vec::new(),
        }
    }
}

impl Config {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// The configured layout path, or a [`VisionError::Config`] explaining how
    /// to set one.
    pub fn require_layout_path(&self) -> Result<&Path, VisionError> {
        self.layout_path.as_deref().ok_or_else(|| {
            VisionError::Config(
                "no field layout configured; set layout_path, TAGFUSE_LAYOUT or --layout".to_string(),
            )
        })
    }
}

/// Return the path to `~/.tagfuse/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".tagfuse").join("config.toml")
}

/// Load the config from `path`, or from the default location when `path` is
/// `None`.  A missing file yields the defaults.  Environment overrides are
/// applied in both cases.
pub fn load(path: Option<&Path>) -> Result<Config, VisionError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let mut cfg = load_from(&path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg)?;
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if the file does not
/// exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, VisionError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        VisionError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| VisionError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `TAGFUSE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TAGFUSE_LAYOUT` | `layout_path` |
/// | `TAGFUSE_ALLIANCE` | `alliance` |
/// | `TAGFUSE_PERIOD_MS` | `period_ms` |
///
/// # Errors
///
/// [`VisionError::Config`] if a variable is set to an unparseable value.
pub fn apply_env_overrides(cfg: &mut Config) -> Result<(), VisionError> {
    if let Ok(v) = std::env::var("TAGFUSE_LAYOUT") {
        cfg.layout_path = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("TAGFUSE_ALLIANCE") {
        cfg.alliance = v.parse()?;
    }
    if let Ok(v) = std::env::var("TAGFUSE_PERIOD_MS") {
        cfg.period_ms = v
            .trim()
            .parse()
            .map_err(|_| VisionError::Config(format!("TAGFUSE_PERIOD_MS is not a number: '{v}'")))?;
    }
    Ok(())
}

/// Save the config to `path`, creating parent directories as needed.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), VisionError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| VisionError::Config(format!("failed to create config directory: {e}")))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| VisionError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw).map_err(|e| {
        VisionError::Config(format!("failed to write config at {}: {e}", path.display()))
    })
}
