//! Recbridge Telemetry - Prometheus metrics
//!
//! Central registry of typed, labeled counters and histograms for the
//! gateway pipeline, the cache, the sync plane, and the upstream transport.

pub mod metrics;

pub use metrics::MetricsRegistry;
