//! Prometheus metrics for the HTTP front end.
//!
//! - HTTP request metrics (latency, counts, in flight)
//! - Dispatcher and record store gauges (collected dynamically)
//! - Core metrics registered from `dossier_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;

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
            "dossier_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dossier_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "dossier_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Dispatcher Metrics (collected dynamically)
// =============================================================================

/// Acquisition jobs currently running.
pub static JOBS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("dossier_jobs_running", "Number of acquisition jobs running").unwrap()
});

/// Acquisition jobs waiting for a free slot.
pub static JOBS_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "dossier_jobs_queued",
        "Number of acquisition jobs waiting for a slot",
    )
    .unwrap()
});

/// Case records in the store.
pub static CASE_RECORDS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("dossier_case_records", "Number of case records stored").unwrap()
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

    // Dispatcher
    registry.register(Box::new(JOBS_RUNNING.clone())).unwrap();
    registry.register(Box::new(JOBS_QUEUED.clone())).unwrap();
    registry.register(Box::new(CASE_RECORDS.clone())).unwrap();

    // Core metrics (orchestrator, dispatcher, notifications)
    for metric in dossier_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Refresh gauges from the dispatcher and record store before encoding.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.dispatcher().status().await;
    JOBS_RUNNING.set(status.running as i64);
    JOBS_QUEUED.set(status.queued as i64);

    if let Ok(count) = state.case_store().count() {
        CASE_RECORDS.set(count);
    }
}

static CASE_NUMBER_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\d{7}-\d{2}\.\d{4}\.\d\.\d{2}\.\d{4}(/|$)").unwrap());

static DIGITS_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace case numbers and file names).
pub fn normalize_path(path: &str) -> String {
    if path.starts_with("/static/") {
        return "/static/{file}".to_string();
    }

    let result = CASE_NUMBER_SEGMENT.replace_all(path, "/{case_number}$1");
    let result = DIGITS_SEGMENT.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_case_number() {
        let path = "/api/v1/cases/0001234-56.2023.8.26.0100";
        assert_eq!(normalize_path(path), "/api/v1/cases/{case_number}");
    }

    #[test]
    fn test_normalize_path_job_by_case() {
        let path = "/api/v1/jobs/0001234-56.2023.8.26.0100";
        assert_eq!(normalize_path(path), "/api/v1/jobs/{case_number}");
    }

    #[test]
    fn test_normalize_path_case_timeline() {
        let path = "/api/v1/cases/0001234-56.2023.8.26.0100/audit";
        assert_eq!(normalize_path(path), "/api/v1/cases/{case_number}/audit");
    }

    #[test]
    fn test_normalize_path_static_file() {
        let path = "/static/0001234-56.2023.8.26.0100.pdf";
        assert_eq!(normalize_path(path), "/static/{file}");
    }

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/cases/12345"), "/api/v1/cases/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/health";
        assert_eq!(normalize_path(path), "/api/v1/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("dossier_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_dispatcher_gauges() {
        JOBS_RUNNING.set(0);
        JOBS_QUEUED.set(0);
        CASE_RECORDS.set(0);
        HTTP_REQUESTS_IN_FLIGHT.set(0);

        let output = encode_metrics();

        assert!(output.contains("dossier_jobs_running"));
        assert!(output.contains("dossier_jobs_queued"));
        assert!(output.contains("dossier_case_records"));
        assert!(output.contains("dossier_http_requests_in_flight"));
    }
}
