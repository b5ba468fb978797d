//! Metrics recording implementation using Prometheus.

use prometheus::{
    register_counter_vec_with_registry, register_histogram_vec_with_registry, CounterVec,
    Encoder, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Prometheus metrics collector.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // Access gate
    gate_decisions_total: CounterVec,

    // Login
    login_attempts_total: CounterVec,

    // Remote to-do collection
    remote_requests_total: CounterVec,
    remote_request_duration_seconds: HistogramVec,

    // Client-side cache
    cache_lookups_total: CounterVec,
}

impl Metrics {
    /// Creates a new metrics instance with its own Prometheus registry.
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        let gate_decisions_total = register_counter_vec_with_registry!(
            Opts::new("gate_decisions_total", "Access gate decisions"),
            &["visibility", "decision"],
            registry.clone()
        )
        .expect("Failed to register gate_decisions_total");

        let login_attempts_total = register_counter_vec_with_registry!(
            Opts::new("login_attempts_total", "Login attempts per provider"),
            &["provider", "result"],
            registry.clone()
        )
        .expect("Failed to register login_attempts_total");

        let remote_requests_total = register_counter_vec_with_registry!(
            Opts::new(
                "remote_requests_total",
                "Requests made to the remote to-do collection"
            ),
            &["method", "outcome"],
            registry.clone()
        )
        .expect("Failed to register remote_requests_total");

        let remote_request_duration_seconds = register_histogram_vec_with_registry!(
            "remote_request_duration_seconds",
            "Remote to-do request duration in seconds",
            &["method"],
            vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            registry.clone()
        )
        .expect("Failed to register remote_request_duration_seconds");

        let cache_lookups_total = register_counter_vec_with_registry!(
            Opts::new("cache_lookups_total", "Client cache lookups by outcome"),
            &["outcome"],
            registry.clone()
        )
        .expect("Failed to register cache_lookups_total");

        Metrics {
            registry,
            gate_decisions_total,
            login_attempts_total,
            remote_requests_total,
            remote_request_duration_seconds,
            cache_lookups_total,
        }
    }

    pub fn record_gate_decision(&self, visibility: &str, decision: &str) {
        self.gate_decisions_total
            .with_label_values(&[visibility, decision])
            .inc();
    }

    pub fn record_login_attempt(&self, provider: &str, result: &str) {
        self.login_attempts_total
            .with_label_values(&[provider, result])
            .inc();
    }

    pub fn record_remote_request(&self, method: &str, outcome: &str, duration_secs: f64) {
        self.remote_requests_total
            .with_label_values(&[method, outcome])
            .inc();
        self.remote_request_duration_seconds
            .with_label_values(&[method])
            .observe(duration_secs);
    }

    /// `outcome` is one of `fresh`, `stale`, `miss`, `deduplicated`.
    pub fn record_cache_lookup(&self, outcome: &str) {
        self.cache_lookups_total.with_label_values(&[outcome]).inc();
    }

    /// Renders all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
