//! Observability: drift detection and in-process metrics.

pub mod drift;
pub mod metrics;

pub use drift::{DriftSignal, DriftTracker};
pub use metrics::{LatencySummary, MetricsCollector};
