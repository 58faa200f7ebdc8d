//! # tagalloc Telemetry
//!
//! Log subscriber setup and Prometheus gauges for the allocation tracker.

pub mod logging;
pub mod metrics;

pub use logging::LogSetup;
pub use metrics::{AllocationMetrics, MetricsError};
