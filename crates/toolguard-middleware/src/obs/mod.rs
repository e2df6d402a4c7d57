//! Observability: request records, sinks and in-process metrics.
//!
//! Metrics are stored as atomics and rendered in Prometheus text format by
//! whatever host exposes them. Logging never feeds back into policy.

pub mod logger;
pub mod metrics;

pub use logger::{JsonLinesSink, RecordBuffer, RecordSink, RequestLogger, TracingSink};
pub use metrics::GuardMetrics;
