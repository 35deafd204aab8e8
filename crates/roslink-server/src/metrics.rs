//! Metrics collection and export for roslink.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const SESSIONS_TOTAL: &str = "roslink_sessions_total";
    pub const SESSIONS_ACTIVE: &str = "roslink_sessions_active";
    pub const VERBS_TOTAL: &str = "roslink_verbs_total";
    pub const MESSAGES_TOTAL: &str = "roslink_messages_total";
    pub const SERVICE_RESPONSES_TOTAL: &str = "roslink_service_responses_total";
    pub const ERRORS_TOTAL: &str = "roslink_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::SESSIONS_TOTAL,
        "Total number of bridge sessions since server start"
    );
    metrics::describe_gauge!(names::SESSIONS_ACTIVE, "Current number of bridge sessions");
    metrics::describe_counter!(names::VERBS_TOTAL, "Verbs received from clients, by op");
    metrics::describe_counter!(
        names::MESSAGES_TOTAL,
        "Decoded topic messages forwarded to clients"
    );
    metrics::describe_counter!(
        names::SERVICE_RESPONSES_TOTAL,
        "Service responses forwarded to clients, by result"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a verb.
pub fn record_verb(op: &str) {
    counter!(names::VERBS_TOTAL, "op" => op.to_string()).increment(1);
}

/// Record a forwarded topic message.
pub fn record_message() {
    counter!(names::MESSAGES_TOTAL).increment(1);
}

/// Record a forwarded service response.
pub fn record_service_response(result: bool) {
    counter!(names::SERVICE_RESPONSES_TOTAL, "result" => result.to_string()).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records the end of a session on drop.
pub struct SessionMetricsGuard;

impl SessionMetricsGuard {
    /// Create a new metrics guard, recording a session.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::SESSIONS_TOTAL).increment(1);
        gauge!(names::SESSIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for SessionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::SESSIONS_ACTIVE).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_without_exporter() {
        let _guard = SessionMetricsGuard::new();
        record_verb("publish");
        record_message();
        record_service_response(false);
        record_error("upstream");
    }
}
