//! Telemetry: structured logging and metric descriptions.
//!
//! # Example
//!
//! ```rust,no_run
//! use warden_core::telemetry::{init_logging, describe_metrics, LoggingConfig};
//!
//! init_logging(&LoggingConfig::default()).expect("Failed to initialize logging");
//! describe_metrics();
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::describe_metrics;
