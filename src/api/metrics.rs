//! Adapter self-metrics.
//!
//! A small prometheus_client registry exposed on `/metrics` so the monitoring
//! system scraping through this adapter can also watch the adapter itself.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

/// Container for all adapter metrics.
pub struct Metrics {
    registry: Registry,

    /// Samples successfully inserted.
    pub write_samples_total: Counter,

    /// Individual INSERT statements rejected by the engine.
    pub write_statement_failures_total: Counter,

    /// Samples dropped before insertion (unknown metric, empty name,
    /// unrepresentable timestamp, failed table creation).
    pub write_samples_dropped_total: Counter,

    /// Read queries received.
    pub read_queries_total: Counter,

    /// Read queries skipped by policy (empty result, row ceiling,
    /// malformed matcher, unknown table).
    pub read_queries_skipped_total: Counter,

    /// Pool acquisitions that timed out.
    pub pool_timeouts_total: Counter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let write_samples_total = Counter::default();
        registry.register(
            "tsrelay_write_samples",
            "Samples successfully inserted",
            write_samples_total.clone(),
        );

        let write_statement_failures_total = Counter::default();
        registry.register(
            "tsrelay_write_statement_failures",
            "INSERT statements rejected by the engine",
            write_statement_failures_total.clone(),
        );

        let write_samples_dropped_total = Counter::default();
        registry.register(
            "tsrelay_write_samples_dropped",
            "Samples dropped before insertion",
            write_samples_dropped_total.clone(),
        );

        let read_queries_total = Counter::default();
        registry.register(
            "tsrelay_read_queries",
            "Read queries received",
            read_queries_total.clone(),
        );

        let read_queries_skipped_total = Counter::default();
        registry.register(
            "tsrelay_read_queries_skipped",
            "Read queries skipped by policy",
            read_queries_skipped_total.clone(),
        );

        let pool_timeouts_total = Counter::default();
        registry.register(
            "tsrelay_pool_timeouts",
            "Pool acquisitions that timed out",
            pool_timeouts_total.clone(),
        );

        Self {
            registry,
            write_samples_total,
            write_statement_failures_total,
            write_samples_dropped_total,
            read_queries_total,
            read_queries_skipped_total,
            pool_timeouts_total,
        }
    }

    /// Text exposition of the registry.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        // Encoding only fails on a fmt::Write error, which String cannot hit.
        let _ = encode(&mut buffer, &self.registry);
        buffer
    }
}
