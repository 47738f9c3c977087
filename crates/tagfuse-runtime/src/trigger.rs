//! [`EdgeTrigger`] – rising-edge detector for run-once command bindings.
//!
//! A binding condition is polled every tick.  Holding it true must not
//! re-issue the command each tick, so the trigger only fires on a
//! false → true transition.
//!
//! # Example
//!
//! ```rust
//! use tagfuse_runtime::trigger::EdgeTrigger;
//!
//! let mut trigger = EdgeTrigger::new();
//!
//! assert!(trigger.update(true));   // rising edge → fire
//! assert!(!trigger.update(true));  // still held → quiet
//! assert!(!trigger.update(false)); // released
//! assert!(trigger.update(true));   // pressed again → fire
//! ```

/// Fires once per false → true transition of a polled condition.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeTrigger {
    last: bool,
}

impl EdgeTrigger {
    /// A trigger whose condition starts out false.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current condition level.  Returns `true` on a rising edge.
    pub fn update(&mut self, level: bool) -> bool {
        let fired = level && !self.last;
        self.last = level;
        fired
    }
}
