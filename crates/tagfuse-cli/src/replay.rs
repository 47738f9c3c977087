//! Recorded detection frames and driver input for `tagfuse run`.
//!
//! A replay file holds one JSON object per line.  A frame line names the tick
//! the frame is released on, the camera that produced it and the frame itself;
//! a button line records a driver button changing state on a tick:
//!
//! ```json
//! {"tick":0,"camera":"Front_Left_Swerve","frame":{"timestamp":0.02,"detections":[...]}}
//! {"tick":12,"button":1,"pressed":true}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tagfuse_hal::{DetectionFrame, ReplayCamera};
use tagfuse_types::VisionError;
use tracing::warn;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayLine {
    Frame {
        tick: u64,
        camera: String,
        frame: DetectionFrame,
    },
    Button {
        tick: u64,
        button: u32,
        pressed: bool,
    },
}

/// The recorded state changes of one driver button.
#[derive(Debug, Clone, Default)]
pub struct ButtonTrack {
    /// `(tick, pressed)`, sorted by tick.
    changes: Vec<(u64, bool)>,
}

impl ButtonTrack {
    fn record(&mut self, tick: u64, pressed: bool) {
        let pos = self.changes.iter().position(|(t, _)| *t > tick).unwrap_or(self.changes.len());
        self.changes.insert(pos, (tick, pressed));
    }

    /// `true` if the replay never mentions this button.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Level on `tick`: the latest change at or before it, released before
    /// the first change.
    pub fn is_pressed(&self, tick: u64) -> bool {
        self.changes
            .iter()
            .take_while(|(t, _)| *t <= tick)
            .last()
            .is_some_and(|(_, pressed)| *pressed)
    }
}

/// Frames grouped per camera, ready to be handed to [`ReplayCamera`]s, plus
/// the recorded button tracks.
#[derive(Debug, Default)]
pub struct Replay {
    frames: BTreeMap<String, Vec<(u64, DetectionFrame)>>,
    buttons: BTreeMap<u32, ButtonTrack>,
    last_tick: Option<u64>,
}

impl Replay {
    pub fn load(path: &Path) -> Result<Self, VisionError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            VisionError::Config(format!("cannot read frames file {}: {e}", path.display()))
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, VisionError> {
        let mut replay = Self::default();
        for (n, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry: ReplayLine = serde_json::from_str(line).map_err(|e| {
                VisionError::Config(format!("frames line {}: not a frame or button event: {e}", n + 1))
            })?;
            let tick = match entry {
                ReplayLine::Frame { tick, camera, frame } => {
                    replay.frames.entry(camera).or_default().push((tick, frame));
                    tick
                }
                ReplayLine::Button { tick, button, pressed } => {
                    replay.buttons.entry(button).or_default().record(tick, pressed);
                    tick
                }
            };
            replay.last_tick = replay.last_tick.max(Some(tick));
        }
        Ok(replay)
    }

    /// Total number of frames across all cameras.
    pub fn len(&self) -> usize {
        self.frames.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ticks needed to release every frame and button event.
    pub fn tick_span(&self) -> u64 {
        self.last_tick.map_or(0, |t| t + 1)
    }

    /// Recorded track of `button`; never pressed if it has no events.
    pub fn button(&self, button: u32) -> ButtonTrack {
        self.buttons.get(&button).cloned().unwrap_or_default()
    }

    /// A [`ReplayCamera`] per name in `names`, in that order.  Frames for
    /// cameras not in `names` are dropped with a warning.
    pub fn into_cameras<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Vec<ReplayCamera> {
        let cameras: Vec<ReplayCamera> = names
            .into_iter()
            .map(|name| {
                let mut cam = ReplayCamera::new(name);
                for (tick, frame) in self.frames.remove(name).unwrap_or_default() {
                    cam.schedule(tick, frame);
                }
                cam
            })
            .collect();
        for (name, frames) in &self.frames {
            warn!(camera = %name, frames = frames.len(), "frames for unconfigured camera ignored");
        }
        cameras
    }
}
