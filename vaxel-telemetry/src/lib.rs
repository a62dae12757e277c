//! # Vaxel Telemetry
//!
//! Logging initialisation, structured lifecycle events and Prometheus
//! metrics for the controller.

pub mod logging;
pub mod metrics;

pub use logging::{EventLogger, TelemetryError};
pub use metrics::MetricsRecorder;
