//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the dispatch server:
//! - HTTP request metrics (latency, counts, errors)
//! - Authentication failures
//! - Machines by derived status (collected dynamically)
//!
//! Core counters (queue, tickets, numbering) are registered alongside.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;
use spindle_core::{LayoutFamily, MachineStatus};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "spindle_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("spindle_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "spindle_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Authentication failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "spindle_auth_failures_total",
            "Total authentication failures",
        ),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// Fleet Metrics (collected dynamically)
// =============================================================================

/// Machines per layout and derived status.
pub static MACHINES_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "spindle_machines_by_status",
            "Current machine count by layout and derived status",
        ),
        &["layout", "status"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();

    // Fleet
    registry
        .register(Box::new(MACHINES_BY_STATUS.clone()))
        .unwrap();

    // Core metrics (queue, tickets, numbering, rejections)
    for metric in spindle_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the status gauges reflect the fleet at scrape
/// time.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let listing = match state.plant().registry().list_machines(None) {
        Ok(listing) => listing,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to list machines for metrics");
            return;
        }
    };

    for layout in LayoutFamily::ALL {
        for status in MachineStatus::ALL {
            let count = listing
                .machines
                .iter()
                .filter(|m| m.layout == layout && m.status == status)
                .count();
            MACHINES_BY_STATUS
                .with_label_values(&[layout.as_str(), status.as_str()])
                .set(count as i64);
        }
    }
}

static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});

static MACHINE_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/machines/[abAB]-[^/]+").unwrap());

static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_SEGMENT.replace_all(path, "{id}");
    let result = MACHINE_SEGMENT.replace_all(&result, "/machines/{machine}");
    let result = NUMERIC_SEGMENT.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/tickets/550e8400-e29b-41d4-a716-446655440000/finalize";
        assert_eq!(normalize_path(path), "/api/v1/tickets/{id}/finalize");
    }

    #[test]
    fn test_normalize_path_machine() {
        assert_eq!(
            normalize_path("/api/v1/machines/a-CD12/queue"),
            "/api/v1/machines/{machine}/queue"
        );
        assert_eq!(
            normalize_path("/api/v1/machines/b-N4"),
            "/api/v1/machines/{machine}"
        );
    }

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/orders/1001"), "/api/v1/orders/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
        assert_eq!(
            normalize_path("/api/v1/reports/layouts/a"),
            "/api/v1/reports/layouts/a"
        );
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("spindle_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        // Prometheus only outputs vectors that have at least one child.
        HTTP_REQUEST_DURATION
            .with_label_values(&["GET", "/test", "200"])
            .observe(0.1);
        MACHINES_BY_STATUS.with_label_values(&["a", "free"]).set(0);
        spindle_core::metrics::NUMBERS_ISSUED.inc();

        let output = encode_metrics();
        assert!(output.contains("spindle_http_request_duration_seconds"));
        assert!(output.contains("spindle_http_requests_in_flight"));
        assert!(output.contains("spindle_machines_by_status"));
        assert!(output.contains("spindle_numbers_issued_total"));
    }
}
