//! ## vaxel-telemetry::logging
//! **Subscriber set-up and structured lifecycle events**
//!
//! Verbosity comes from the CLI (`info`, `-v` for `debug`, `--very-verbose`
//! for `trace`) unless `RUST_LOG` is set, which always wins.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use opentelemetry::KeyValue;
use thiserror::Error;
use tracing::info_span;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Cannot open log file: {0}")]
    LogFile(#[from] std::io::Error),

    #[error("Logging already initialised: {0}")]
    Subscriber(String),

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the process-wide subscriber.
    ///
    /// With `log_file` set, records are appended to that file without ANSI
    /// colouring; otherwise they go to stderr.
    pub fn init(level: &str, log_file: Option<&Path>) -> Result<(), TelemetryError> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let builder = fmt().with_env_filter(filter).with_thread_names(true);

        let result = match log_file {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                builder
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init()
            }
            None => builder.with_writer(std::io::stderr).try_init(),
        };
        result.map_err(|e| TelemetryError::Subscriber(e.to_string()))
    }

    /// Records a controller lifecycle event (switch connected, handler
    /// fault, shutdown) with its attributes.
    pub fn log_event(event_type: &str, metadata: &[KeyValue]) {
        let span = info_span!(
            "controller_event",
            event_type = event_type,
            otel.kind = "INTERNAL"
        );
        let _entered = span.enter();
        let attributes: Vec<String> = metadata
            .iter()
            .map(|kv| format!("{}={}", kv.key, kv.value))
            .collect();
        tracing::info!(metadata = ?attributes, "Controller event occurred");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn lifecycle_event_is_logged_with_attributes() {
        EventLogger::log_event(
            "switch_connected",
            &[
                KeyValue::new("dpid", "00:00:00:00:00:01"),
                KeyValue::new("ports", 4),
            ],
        );
        assert!(logs_contain("Controller event occurred"));
        assert!(logs_contain("dpid=00:00:00:00:00:01"));
        assert!(logs_contain("switch_connected"));
    }
}
