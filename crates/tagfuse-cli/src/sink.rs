//! JSON-lines diagnostics sink.
//!
//! Every publication becomes one line:
//!
//! ```json
//! {"time":"2026-03-14T18:02:11.204Z","tick":12,"key":"Vision/stdDev/Front_Left_Swerve","value":0.25}
//! ```

use std::cell::Cell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tagfuse_hal::{DiagnosticValue, Diagnostics};
use tagfuse_types::VisionError;
use tracing::warn;

#[derive(Serialize)]
struct Record<'a> {
    time: String,
    tick: u64,
    key: &'a str,
    value: &'a DiagnosticValue,
}

/// Writes publications to a file, one JSON object per line.
///
/// Write failures are logged once and then ignored; publishing never fails.
pub struct JsonLinesDiagnostics<W: Write> {
    out: W,
    tick: Rc<Cell<u64>>,
    failed: bool,
}

impl JsonLinesDiagnostics<BufWriter<File>> {
    pub fn create(path: &Path, tick: Rc<Cell<u64>>) -> Result<Self, VisionError> {
        let file = File::create(path).map_err(|e| {
            VisionError::Config(format!("cannot create telemetry file {}: {e}", path.display()))
        })?;
        Ok(Self::new(BufWriter::new(file), tick))
    }
}

impl<W: Write> JsonLinesDiagnostics<W> {
    /// `tick` is read on every publication to stamp the record.
    pub fn new(out: W, tick: Rc<Cell<u64>>) -> Self {
        Self {
            out,
            tick,
            failed: false,
        }
    }

    fn write_record(&mut self, key: &str, value: &DiagnosticValue) -> std::io::Result<()> {
        let record = Record {
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            tick: self.tick.get(),
            key,
            value,
        };
        serde_json::to_writer(&mut self.out, &record)?;
        self.out.write_all(b"\n")
    }
}

impl<W: Write> Diagnostics for JsonLinesDiagnostics<W> {
    fn publish(&mut self, key: &str, value: DiagnosticValue) {
        if self.failed {
            return;
        }
        if let Err(e) = self.write_record(key, &value) {
            warn!(error = %e, "telemetry write failed; further diagnostics are dropped");
            self.failed = true;
        }
    }
}

impl<W: Write> Drop for JsonLinesDiagnostics<W> {
    fn drop(&mut self) {
        if let Err(e) = self.out.flush() {
            warn!(error = %e, "telemetry flush failed");
        }
    }
}
