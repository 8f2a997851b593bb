//! Audit trail queries: a filtered event search and a per-case timeline.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use dossier_core::{
    AcquisitionStep, AuditError, AuditFilter, AuditOrder, AuditPage, AuditRecord, CaseNumber,
    CaseTimeline, FailureCause,
};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AuditQueryParams {
    pub case_number: Option<String>,
    /// Comma-separated event types, e.g. `step_retried,acquisition_failed`
    pub event_type: Option<String>,
    /// Step recorded by retry and failure events, e.g. `locating_result`
    pub step: Option<AcquisitionStep>,
    /// Failure cause, e.g. `authentication_rejected`
    pub cause: Option<FailureCause>,
    /// Only retries, failures, quarantines and failed notifications
    #[serde(default)]
    pub trouble: bool,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Newest first unless `chronological` is set
    #[serde(default)]
    pub chronological: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AuditQueryParams {
    fn filter(&self) -> AuditFilter {
        let mut filter = match self.case_number.as_deref() {
            Some(raw) => AuditFilter::for_case(normalize_case_number(raw)),
            None => AuditFilter::new(),
        };

        if self.trouble {
            filter = filter.trouble();
        }
        for event_type in self
            .event_type
            .iter()
            .flat_map(|types| types.split(','))
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            filter = filter.of_type(event_type);
        }

        filter.step = self.step;
        filter.cause = self.cause;
        filter.between(self.since, self.until)
    }
}

#[derive(Debug, Serialize)]
pub struct AuditQueryResponse {
    pub events: Vec<AuditRecord>,
    /// Matching events across all pages
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct AuditErrorResponse {
    pub error: String,
}

type AuditRejection = (StatusCode, Json<AuditErrorResponse>);

fn rejection(status: StatusCode, message: String) -> AuditRejection {
    (status, Json(AuditErrorResponse { error: message }))
}

fn store_failure(what: &str, e: AuditError) -> AuditRejection {
    error!("Failed to {}: {}", what, e);
    rejection(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Failed to {}: {}", what, e),
    )
}

/// Decorated input maps to the canonical number events are stored under.
fn normalize_case_number(raw: &str) -> String {
    CaseNumber::parse(raw)
        .map(|number| number.to_string())
        .unwrap_or_else(|_| raw.trim().to_string())
}

/// Search audit events
pub async fn query_audit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditQueryResponse>, AuditRejection> {
    let page = AuditPage::clamped(params.limit, params.offset);
    let order = if params.chronological {
        AuditOrder::Chronological
    } else {
        AuditOrder::NewestFirst
    };
    let filter = params.filter();

    let store = state.audit_store();
    let events = store
        .query(&filter, order, page)
        .map_err(|e| store_failure("query audit events", e))?;
    let total = store
        .count(&filter)
        .map_err(|e| store_failure("count audit events", e))?;

    Ok(Json(AuditQueryResponse {
        events,
        total,
        limit: page.limit,
        offset: page.offset,
    }))
}

/// The audit history of one case, oldest first, with a summary
pub async fn case_timeline(
    State(state): State<Arc<AppState>>,
    Path(case_number): Path<String>,
) -> Result<Json<CaseTimeline>, AuditRejection> {
    let case_number = CaseNumber::parse(&case_number)
        .map_err(|e| rejection(StatusCode::BAD_REQUEST, e.to_string()))?
        .to_string();

    let events = state
        .audit_store()
        .timeline(&case_number)
        .map_err(|e| store_failure("load case timeline", e))?;

    let timeline = CaseTimeline::from_events(case_number, events);
    if timeline.is_empty() {
        return Err(rejection(
            StatusCode::NOT_FOUND,
            format!("No audit events for case {}", timeline.case_number),
        ));
    }
    Ok(Json(timeline))
}
