use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Safe to call once per process; tests
/// spawning several applications share the first recorder.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }
    if let Ok(handle) = PrometheusBuilder::new().install_recorder() {
        let _ = METRICS_HANDLE.set(handle);
    }
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Record a checkout attempt by provider and outcome (created / rejected /
/// error).
pub fn record_checkout(provider: &str, outcome: &str) {
    metrics::counter!(
        "payments_checkout_total",
        "provider" => provider.to_string(),
        "outcome" => outcome.to_string(),
    )
    .increment(1);
}

/// Record a webhook delivery disposition (applied / duplicate / ignored /
/// unmatched / noop).
pub fn record_webhook(provider: &str, disposition: &str) {
    metrics::counter!(
        "payments_webhook_total",
        "provider" => provider.to_string(),
        "disposition" => disposition.to_string(),
    )
    .increment(1);
}

/// Record a refund attempt outcome (refunded / rejected).
pub fn record_refund(provider: &str, outcome: &str) {
    metrics::counter!(
        "payments_refund_total",
        "provider" => provider.to_string(),
        "outcome" => outcome.to_string(),
    )
    .increment(1);
}
