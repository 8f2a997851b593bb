//! Prometheus metrics for core components.
//!
//! - Orchestrator (runs by outcome, durations, step retries, sessions)
//! - Dispatcher (requests by disposition)
//! - Notifications (deliveries by result)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Orchestrator
// =============================================================================

/// Finished acquisition runs by outcome.
pub static ACQUISITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dossier_acquisitions_total", "Total acquisition runs"),
        &["outcome"], // "acquired", "already_satisfied", "failed"
    )
    .unwrap()
});

/// Acquisition run duration in seconds.
pub static ACQUISITION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "dossier_acquisition_duration_seconds",
            "Duration of acquisition runs",
        )
        .buckets(vec![0.1, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Failures by cause.
pub static ACQUISITION_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dossier_acquisition_failures_total",
            "Failed acquisition runs by cause",
        ),
        &["cause", "step"],
    )
    .unwrap()
});

/// Step attempts that failed and were retried.
pub static STEP_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dossier_step_retries_total", "Total step retries"),
        &["step"],
    )
    .unwrap()
});

/// Sessions opened against the portal.
pub static SESSIONS_OPENED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("dossier_sessions_opened_total", "Total portal sessions opened").unwrap()
});

/// Stale records found during reconciliation.
pub static STALE_RECORDS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "dossier_stale_records_total",
        "Records found without their artifact",
    )
    .unwrap()
});

// =============================================================================
// Dispatcher
// =============================================================================

/// Requests by disposition.
pub static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dossier_requests_total", "Acquisition requests received"),
        &["disposition"], // "accepted", "attached", "already_satisfied"
    )
    .unwrap()
});

// =============================================================================
// Notifications
// =============================================================================

/// Notification deliveries by result.
pub static NOTIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("dossier_notifications_total", "Outcome notifications"),
        &["result"], // "delivered", "failed"
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(ACQUISITIONS_TOTAL.clone()),
        Box::new(ACQUISITION_DURATION.clone()),
        Box::new(ACQUISITION_FAILURES.clone()),
        Box::new(STEP_RETRIES.clone()),
        Box::new(SESSIONS_OPENED.clone()),
        Box::new(STALE_RECORDS.clone()),
        Box::new(REQUESTS_TOTAL.clone()),
        Box::new(NOTIFICATIONS_TOTAL.clone()),
    ]
}
