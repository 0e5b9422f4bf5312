//! Metrics collection and export for hookgate.
//!
//! Uses the `metrics` crate facade. With the `prometheus` feature the recorder
//! is a Prometheus exporter whose output is served at `/metrics`; without it
//! every macro call is a no-op.
//!
//! ```rust,ignore
//! use hookgate_metrics::{counter, labels, webhooks};
//!
//! counter!(webhooks::RECEIVED_TOTAL, labels::PLATFORM => "whatsapp").increment(1);
//! ```

mod definitions;
pub mod error;
mod recorder;

pub use {
    definitions::*,
    error::{Error, Result},
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
