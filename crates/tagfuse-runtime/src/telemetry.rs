//! Process-wide logging for tagfuse binaries.
//!
//! [`init_tracing`] installs one `tracing` subscriber made of three layers:
//!
//! 1. a console formatter, compact or JSON;
//! 2. an OpenTelemetry bridge, present only when a collector is configured,
//!    which exports the robot loop's per-tick spans;
//! 3. an [`EnvFilter`] shared by both.
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Filter directives, `info` when unset. |
//! | `TAGFUSE_LOG_FORMAT` | `json` for newline-delimited JSON, anything else for compact text. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | Collector URL, e.g. `http://localhost:4318`.  Enables span export over OTLP/HTTP. |
//!
//! ```rust,no_run
//! let _guard = tagfuse_runtime::telemetry::init_tracing("tagfuse");
//! // ... run the robot; spans are flushed when `_guard` drops.
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Environment variable selecting the log output format.
pub const LOG_FORMAT_ENV: &str = "TAGFUSE_LOG_FORMAT";

const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Console log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// `json` (any case) selects JSON; anything else, or nothing, is compact.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }

    fn layer(self) -> Box<dyn Layer<Registry> + Send + Sync> {
        match self {
            LogFormat::Json => fmt::layer().json().boxed(),
            LogFormat::Compact => fmt::layer().compact().boxed(),
        }
    }
}

/// Install the global subscriber.  Call once, before the robot starts, and
/// keep the returned guard alive until exit.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = LogFormat::from_env_value(std::env::var(LOG_FORMAT_ENV).ok().as_deref());
    let provider = std::env::var(OTLP_ENDPOINT_ENV)
        .ok()
        .and_then(|endpoint| otlp_provider(service_name, endpoint));
    let otel = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("tagfuse")));

    tracing_subscriber::registry()
        .with(format.layer())
        .with(otel)
        .with(filter)
        .init();

    TracerProviderGuard(provider)
}

/// Flushes and shuts down span export when dropped.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        let Some(provider) = self.0.take() else {
            return;
        };
        if let Err(e) = provider.shutdown() {
            eprintln!("[tagfuse] span export shutdown failed: {e}");
        }
    }
}

/// A provider exporting to `endpoint`, or `None` if the exporter cannot be
/// built.  Failures go to stderr since no subscriber exists yet.
fn otlp_provider(service_name: &str, endpoint: String) -> Option<SdkTracerProvider> {
    let exporter = match SpanExporter::builder().with_http().with_endpoint(endpoint).build() {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("[tagfuse] span export disabled: {e}");
            return None;
        }
    };
    let resource = Resource::builder().with_service_name(service_name.to_string()).build();

    // Ticks run on one thread without an async runtime.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otlp_provider_builds_for_a_valid_endpoint() {
        let provider = otlp_provider("test-service", "http://localhost:4318".to_string());
        assert!(provider.is_some());
        drop(TracerProviderGuard(provider));
    }

    #[test]
    fn guard_without_provider_drops_quietly() {
        drop(TracerProviderGuard(None));
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::from_env_value(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(Some("pretty")), LogFormat::Compact);
        assert_eq!(LogFormat::from_env_value(None), LogFormat::Compact);
    }
}
