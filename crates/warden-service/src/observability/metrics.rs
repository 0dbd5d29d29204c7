//! Metrics definitions for the warden service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `warden_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `outcome`: success/error/suppressed, found/not_found, or an error kind
//!   from [`PipelineError::kind`](crate::errors::PipelineError::kind)
//! - `change_type`: create/remove
//!
//! Rule ids and source ids are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus recorder and serve it on `bind_address`.
///
/// Must be called from within a tokio runtime, before metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder cannot be installed (e.g., already
/// installed) or the listener cannot be bound.
pub fn init_metrics_exporter(bind_address: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        // Pipeline executions include remote calls (key sets, identity info)
        .set_buckets_for_metric(
            Matcher::Prefix("warden_pipeline".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set pipeline duration buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("warden_key_set_fetch".to_string()),
            &[0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000],
        )
        .map_err(|e| format!("Failed to set key set fetch buckets: {e}"))?
        .with_http_listener(bind_address)
        .install()
        .map_err(|e| format!("Failed to install Prometheus metrics exporter: {e}"))
}

// ============================================================================
// Rule Repository Metrics
// ============================================================================

/// Record the outcome of applying a rule-set change event.
///
/// Metric: `warden_rule_set_changes_total`
/// Labels: `change_type`, `outcome`
pub fn record_rule_set_change(change_type: &'static str, outcome: &'static str) {
    counter!("warden_rule_set_changes_total",
        "change_type" => change_type,
        "outcome" => outcome
    )
    .increment(1);
}

/// Set the number of active rules.
///
/// Metric: `warden_rules_active`
pub fn set_rules_active(count: usize) {
    // usize to f64 conversion is safe for realistic rule counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("warden_rules_active").set(count as f64);
}

/// Record a rule lookup.
///
/// Metric: `warden_rule_lookups_total`
/// Labels: `outcome` (found, not_found)
pub fn record_rule_lookup(found: bool) {
    let outcome = if found { "found" } else { "not_found" };
    counter!("warden_rule_lookups_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// Pipeline Metrics
// ============================================================================

/// Record a completed rule execution.
///
/// Metric: `warden_pipeline_executions_total`, `warden_pipeline_duration_seconds`
/// Labels: `outcome` (success, suppressed, or the error kind)
pub fn record_pipeline_execution(outcome: &'static str, duration: Duration) {
    histogram!("warden_pipeline_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
    counter!("warden_pipeline_executions_total", "outcome" => outcome).increment(1);
}

/// Record a key set fetch.
///
/// Metric: `warden_key_set_fetches_total`, `warden_key_set_fetch_duration_seconds`
/// Labels: `outcome` (success or the error kind)
pub fn record_key_set_fetch(outcome: &'static str, duration: Duration) {
    histogram!("warden_key_set_fetch_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
    counter!("warden_key_set_fetches_total", "outcome" => outcome).increment(1);
}
