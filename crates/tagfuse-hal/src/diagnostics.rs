//! Key/value telemetry publication.
//!
//! Keys are slash-separated table paths such as `Vision/stdDev/Front_Left_Swerve`
//! or `Cameras/Front_Left_Swerve/has target`.  Publishing is fire-and-forget:
//! a sink never reports failure back to the control code.
//!
//! | Sink | Behaviour |
//! |---|---|
//! | [`NullDiagnostics`] | Discards everything. |
//! | [`RecordingDiagnostics`] | Keeps the latest value per key in a shared in-memory table. |
//! | [`TracingDiagnostics`] | Emits a `trace!` event per publication. |

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// A published telemetry value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiagnosticValue {
    Number(f64),
    NumberArray(Vec<f64>),
    Boolean(bool),
}

/// A telemetry sink.
pub trait Diagnostics {
    fn publish(&mut self, key: &str, value: DiagnosticValue);

    fn put_number(&mut self, key: &str, value: f64) {
        self.publish(key, DiagnosticValue::Number(value));
    }

    fn put_number_array(&mut self, key: &str, values: &[f64]) {
        self.publish(key, DiagnosticValue::NumberArray(values.to_vec()));
    }

    fn put_boolean(&mut self, key: &str, value: bool) {
        self.publish(key, DiagnosticValue::Boolean(value));
    }
}

/// Discards every publication.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDiagnostics;

impl Diagnostics for NullDiagnostics {
    fn publish(&mut self, _key: &str, _value: DiagnosticValue) {}
}

/// In-memory table holding the most recent value per key.
///
/// Clones share the same table, so a test can keep one handle while the robot
/// owns another.
#[derive(Debug, Default, Clone)]
pub struct RecordingDiagnostics {
    table: Rc<RefCell<BTreeMap<String, DiagnosticValue>>>,
    publications: Rc<Cell<u64>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<DiagnosticValue> {
        self.table.borrow().get(key).cloned()
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            DiagnosticValue::Number(v) => Some(v),
            _ => None,
        }
    }

    pub fn number_array(&self, key: &str) -> Option<Vec<f64>> {
        match self.get(key)? {
            DiagnosticValue::NumberArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn boolean(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            DiagnosticValue::Boolean(v) => Some(v),
            _ => None,
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.table.borrow().keys().cloned().collect()
    }

    /// Total number of publications, including overwrites.
    pub fn publication_count(&self) -> u64 {
        self.publications.get()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn publish(&mut self, key: &str, value: DiagnosticValue) {
        self.table.borrow_mut().insert(key.to_string(), value);
        self.publications.set(self.publications.get() + 1);
    }
}

/// Forwards every publication to `tracing` at TRACE level under the
/// `tagfuse::diagnostics` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn publish(&mut self, key: &str, value: DiagnosticValue) {
        trace!(target: "tagfuse::diagnostics", key, value = ?value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_keeps_latest_value() {
        let mut diag = RecordingDiagnostics::new();
        diag.put_number("Vision/tagCount/cam", 1.0);
        diag.put_number("Vision/tagCount/cam", 2.0);
        assert_eq!(diag.number("Vision/tagCount/cam"), Some(2.0));
        assert_eq!(diag.publication_count(), 2);
    }

    #[test]
    fn clones_share_the_table() {
        let handle = RecordingDiagnostics::new();
        let mut sink: Box<dyn Diagnostics> = Box::new(handle.clone());
        sink.put_boolean("Cameras/cam/has target", true);
        sink.put_number_array("Vision/ClosestAprilTag", &[1.0, 2.0, 3.0]);
        assert_eq!(handle.boolean("Cameras/cam/has target"), Some(true));
        assert_eq!(
            handle.number_array("Vision/ClosestAprilTag"),
            Some(vec![1.0, 2.0, 3.0])
        );
        assert_eq!(handle.publication_count(), 2);
    }

    #[test]
    fn typed_getters_reject_mismatched_kinds() {
        let mut diag = RecordingDiagnostics::new();
        diag.put_boolean("flag", false);
        assert_eq!(diag.number("flag"), None);
        assert_eq!(diag.number("missing"), None);
    }

    #[test]
    fn value_serializes_untagged() {
        let json = serde_json::to_string(&DiagnosticValue::NumberArray(vec![1.0, 2.5])).unwrap();
        assert_eq!(json, "[1.0,2.5]");
        let json = serde_json::to_string(&DiagnosticValue::Boolean(true)).unwrap();
        assert_eq!(json, "true");
    }

    #[test]
    fn null_and_tracing_sinks_accept_everything() {
        NullDiagnostics.put_number("x", 1.0);
        TracingDiagnostics.put_number_array("y", &[f64::INFINITY]);
    }
}
