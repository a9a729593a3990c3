//! Prometheus metrics registry for recbridge
//!
//! Provides typed, labeled counters and histograms for all observable
//! operations in the gateway, cache, and sync plane.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Central metrics registry holding all Prometheus metrics.
pub struct MetricsRegistry {
    registry: Registry,
    /// Counter: gateway operations by (operation, status)
    pub gateway_requests_total: IntCounterVec,
    /// Counter: cache lookups by (operation, outcome: hit/miss)
    pub cache_lookups_total: IntCounterVec,
    /// Counter: cache entries evicted by invalidation, by model
    pub cache_invalidations_total: IntCounterVec,
    /// Counter: delta pulls by (profile, outcome)
    pub sync_pulls_total: IntCounterVec,
    /// Counter: offline push items by (action, status)
    pub push_items_total: IntCounterVec,
    /// Counter: conflicts by strategy
    pub conflicts_total: IntCounterVec,
    /// Counter: rate-limit rejections by window class
    pub rate_limited_total: IntCounterVec,
    /// Histogram: upstream call duration in seconds, by method
    pub upstream_duration_seconds: HistogramVec,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("recbridge".to_string()), None)?;

        let gateway_requests_total = IntCounterVec::new(
            Opts::new("gateway_requests_total", "Gateway operations"),
            &["operation", "status"],
        )?;
        registry.register(Box::new(gateway_requests_total.clone()))?;

        let cache_lookups_total = IntCounterVec::new(
            Opts::new("cache_lookups_total", "Cache lookups by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(cache_lookups_total.clone()))?;

        let cache_invalidations_total = IntCounterVec::new(
            Opts::new("cache_invalidations_total", "Cache entries invalidated"),
            &["model"],
        )?;
        registry.register(Box::new(cache_invalidations_total.clone()))?;

        let sync_pulls_total = IntCounterVec::new(
            Opts::new("sync_pulls_total", "Delta pulls"),
            &["profile", "outcome"],
        )?;
        registry.register(Box::new(sync_pulls_total.clone()))?;

        let push_items_total = IntCounterVec::new(
            Opts::new("push_items_total", "Offline push items"),
            &["action", "status"],
        )?;
        registry.register(Box::new(push_items_total.clone()))?;

        let conflicts_total = IntCounterVec::new(
            Opts::new("conflicts_total", "Conflicts by strategy"),
            &["strategy"],
        )?;
        registry.register(Box::new(conflicts_total.clone()))?;

        let rate_limited_total = IntCounterVec::new(
            Opts::new("rate_limited_total", "Rate-limit rejections"),
            &["class"],
        )?;
        registry.register(Box::new(rate_limited_total.clone()))?;

        let upstream_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "upstream_duration_seconds",
                "Upstream call duration in seconds",
            )
            .buckets(vec![0.05, 0.25, 1.0, 5.0, 30.0, f64::INFINITY]),
            &["method"],
        )?;
        registry.register(Box::new(upstream_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            gateway_requests_total,
            cache_lookups_total,
            cache_invalidations_total,
            sync_pulls_total,
            push_items_total,
            conflicts_total,
            rate_limited_total,
            upstream_duration_seconds,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    /// Record one gateway operation outcome.
    pub fn record_request(&self, operation: &str, status: &str) {
        self.gateway_requests_total
            .with_label_values(&[operation, status])
            .inc();
    }

    /// Record a cache lookup outcome (`hit` / `miss`).
    pub fn record_cache_lookup(&self, operation: &str, hit: bool) {
        let outcome = if hit { "hit" } else { "miss" };
        self.cache_lookups_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    /// Record invalidated entries for a model.
    pub fn record_invalidation(&self, model: &str, count: u64) {
        self.cache_invalidations_total
            .with_label_values(&[model])
            .inc_by(count);
    }

    /// Record a delta pull outcome.
    pub fn record_pull(&self, profile: &str, outcome: &str) {
        self.sync_pulls_total
            .with_label_values(&[profile, outcome])
            .inc();
    }

    /// Record one processed push item.
    pub fn record_push_item(&self, action: &str, status: &str) {
        self.push_items_total
            .with_label_values(&[action, status])
            .inc();
    }

    /// Record a detected conflict.
    pub fn record_conflict(&self, strategy: &str) {
        self.conflicts_total.with_label_values(&[strategy]).inc();
    }

    /// Record a rate-limit rejection.
    pub fn record_rate_limited(&self, class: &str) {
        self.rate_limited_total.with_label_values(&[class]).inc();
    }

    /// Observe an upstream call duration.
    pub fn observe_upstream(&self, method: &str, seconds: f64) {
        self.upstream_duration_seconds
            .with_label_values(&[method])
            .observe(seconds);
    }

    /// Encode all metrics in the Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
