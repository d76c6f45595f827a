//! Prometheus metrics for query executions and the result cache.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Metrics owned by one dashboard instance. Each instance carries its own
/// registry so several can coexist in one process.
pub struct Metrics {
    registry: Registry,
    executions: IntCounterVec,
    duration: Histogram,
    rows: IntCounter,
    cache_lookups: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let executions = IntCounterVec::new(
            Opts::new(
                "flowdash_query_executions_total",
                "Query executions by final outcome",
            ),
            &["outcome"],
        )?;
        let duration = Histogram::with_opts(
            HistogramOpts::new(
                "flowdash_query_duration_seconds",
                "Wall time from submission to finished table",
            )
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        )?;
        let rows = IntCounter::new(
            "flowdash_result_rows_total",
            "Data rows fetched from successful executions",
        )?;
        let cache_lookups = IntCounterVec::new(
            Opts::new("flowdash_cache_lookups_total", "Result cache lookups"),
            &["result"],
        )?;

        registry.register(Box::new(executions.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(rows.clone()))?;
        registry.register(Box::new(cache_lookups.clone()))?;

        Ok(Self {
            registry,
            executions,
            duration,
            rows,
            cache_lookups,
        })
    }

    pub fn record_execution(&self, outcome: &str, elapsed_secs: f64) {
        self.executions.with_label_values(&[outcome]).inc();
        self.duration.observe(elapsed_secs);
    }

    pub fn record_rows(&self, count: usize) {
        self.rows.inc_by(count as u64);
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let label = if hit { "hit" } else { "miss" };
        self.cache_lookups.with_label_values(&[label]).inc();
    }

    pub fn execution_count(&self, outcome: &str) -> u64 {
        self.executions.with_label_values(&[outcome]).get()
    }

    pub fn cache_lookup_count(&self, hit: bool) -> u64 {
        let label = if hit { "hit" } else { "miss" };
        self.cache_lookups.with_label_values(&[label]).get()
    }

    /// Text exposition of every registered metric
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
