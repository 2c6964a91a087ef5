//! Runtime metrics using the native Prometheus client.
//!
//! Metrics are domain-specific rather than generic event counters. Use
//! traces for event-level granularity during investigations.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Gauge,
};
use std::sync::OnceLock;

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Domain metrics for the exchange runtime.
pub struct Metrics {
    /// Exchanges started.
    pub exchanges_started: Counter,
    /// Exchanges terminated, labelled by terminal outcome.
    pub exchanges_terminated: CounterVec,
    /// Key/clock entries handed to repair actions.
    pub repair_keys: Counter,
    /// Exchanges currently running.
    pub active_exchanges: Gauge,
}

impl Metrics {
    fn new() -> Self {
        Self {
            exchanges_started: register_counter!(
                "converge_exchanges_started_total",
                "Total number of exchanges started"
            )
            .unwrap(),
            exchanges_terminated: register_counter_vec!(
                "converge_exchanges_terminated_total",
                "Total number of exchanges terminated, by outcome",
                &["outcome"]
            )
            .unwrap(),
            repair_keys: register_counter!(
                "converge_repair_keys_total",
                "Total key/clock entries handed to repair actions"
            )
            .unwrap(),
            active_exchanges: register_gauge!(
                "converge_active_exchanges",
                "Number of exchanges currently running"
            )
            .unwrap(),
        }
    }
}

/// Global metrics handle.
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
