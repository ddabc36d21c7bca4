//! Prometheus metrics endpoint
//!
//! Exposes application metrics in Prometheus format for monitoring.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;

use crate::providers::ProviderKind;

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: Lazy<PrometheusHandle> = Lazy::new(|| {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
});

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    // Force initialization of the lazy static
    let _ = &*PROMETHEUS_HANDLE;

    register_metrics();
}

/// Register all custom metrics
fn register_metrics() {
    metrics::describe_counter!(
        "switchyard_sessions_total",
        "Total turns started, by provider and mode"
    );
    metrics::describe_counter!(
        "switchyard_interrupts_total",
        "Total interrupt requests that reached a session"
    );
    metrics::describe_counter!(
        "switchyard_events_total",
        "Total normalized events streamed, by type"
    );
    metrics::describe_histogram!(
        "switchyard_turn_duration_seconds",
        "Turn duration in seconds"
    );
}

/// Prometheus metrics endpoint handler
///
/// Returns metrics in Prometheus text format for scraping.
pub async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE.render()
}

/// Record a started turn
pub fn record_session(provider: ProviderKind, mode: &str) {
    metrics::counter!(
        "switchyard_sessions_total",
        "provider" => provider.to_string(),
        "mode" => mode.to_string()
    )
    .increment(1);
}

/// Record a delivered interrupt
pub fn record_interrupt() {
    metrics::counter!("switchyard_interrupts_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        // This should not panic
        init_metrics();
    }
}
