//! Prometheus metrics for tradelock sessions.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error caught on first use.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_int_gauge, Counter,
    CounterVec, Encoder, Histogram, IntGauge, TextEncoder,
};

/// Reconciliation attempts.
/// Labels: kind (forced/scheduled), outcome (ok/failed/dropped)
pub static RECONCILIATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tradelock_reconciliations_total",
        "Total reconciliation attempts by kind and outcome",
        &["kind", "outcome"]
    )
    .unwrap()
});

/// Absolute drift between local extrapolation and server samples.
pub static DRIFT_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "tradelock_drift_seconds",
        "Absolute countdown drift observed at reconciliation",
        vec![0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap()
});

/// Times a server sample replaced the local countdown sample.
pub static SAMPLE_SNAPS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "tradelock_sample_snaps_total",
        "Total countdown sample replacements"
    )
    .unwrap()
});

/// Lock action results.
/// Labels: outcome (committed/rolled_back)
pub static LOCK_ACTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tradelock_lock_actions_total",
        "Total lock actions by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Sessions that left the active phase.
/// Labels: reason (completed/expired/unmounted)
pub static SESSIONS_TERMINAL_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tradelock_sessions_terminal_total",
        "Total sessions ended by reason",
        &["reason"]
    )
    .unwrap()
});

/// Currently mounted sessions.
pub static ACTIVE_SESSIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("tradelock_active_sessions", "Currently mounted sessions").unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record a reconciliation attempt.
    pub fn reconciliation(forced: bool, outcome: &str) {
        let kind = if forced { "forced" } else { "scheduled" };
        RECONCILIATIONS_TOTAL
            .with_label_values(&[kind, outcome])
            .inc();
    }

    /// Record observed drift in seconds.
    pub fn drift(delta_secs: f64) {
        DRIFT_SECONDS.observe(delta_secs);
    }

    /// Record a countdown sample replacement.
    pub fn sample_snap() {
        SAMPLE_SNAPS_TOTAL.inc();
    }

    /// Record a lock action outcome.
    pub fn lock_action(outcome: &str) {
        LOCK_ACTIONS_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record a session mount.
    pub fn session_mounted() {
        ACTIVE_SESSIONS.inc();
    }

    /// Record a session leaving the active phase.
    pub fn session_terminal(reason: &str) {
        SESSIONS_TERMINAL_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record a session actor exiting.
    pub fn session_unmounted() {
        ACTIVE_SESSIONS.dec();
    }

    /// Render all registered metrics in the text exposition format.
    pub fn gather_text() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buf)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
