//! Case acquisition and record API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use dossier_core::{
    AcquisitionRequest, CaseNumber, CaseRecord, DispatchError, Disposition, Reconciliation,
    StoredArtifact,
};

use crate::state::AppState;

/// Maximum allowed limit for case listings
const MAX_LIMIT: i64 = 1000;

/// Default limit for case listings
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for acquiring a case
#[derive(Debug, Deserialize)]
pub struct AcquireCaseBody {
    pub case_number: String,
    /// Webhook notified when the job finishes; overrides the configured target
    pub callback_url: Option<String>,
}

/// Answer to an acquisition request
#[derive(Debug, Serialize)]
pub struct AcquireCaseResponse {
    /// accepted, attached or already_satisfied
    pub status: Disposition,
    pub job_id: String,
    pub case_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<StoredArtifact>,
}

#[derive(Debug, Deserialize)]
pub struct ListCasesParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListCasesResponse {
    pub cases: Vec<CaseRecord>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// A record together with what storage says about it
#[derive(Debug, Serialize)]
pub struct CaseDetailResponse {
    pub record: CaseRecord,
    /// satisfied or stale
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<StoredArtifact>,
}

#[derive(Debug, Serialize)]
pub struct CaseErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(CaseErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// Request acquisition of a case document.
///
/// Answers 200 when the case is already stored, 202 when a job was created
/// or joined.
pub async fn acquire_case(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AcquireCaseBody>,
) -> Response {
    let case_number = match CaseNumber::parse(&body.case_number) {
        Ok(case_number) => case_number,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let mut request = AcquisitionRequest::new(case_number.to_string());
    if let Some(url) = body.callback_url.filter(|url| !url.trim().is_empty()) {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("callback_url must be an http(s) URL: {}", url),
            );
        }
        request = request.with_callback(url);
    }

    match state.dispatcher().acquire(request).await {
        Ok((ack, _handle)) => {
            let status = match ack.disposition {
                Disposition::AlreadySatisfied => StatusCode::OK,
                Disposition::Accepted | Disposition::Attached => StatusCode::ACCEPTED,
            };
            (
                status,
                Json(AcquireCaseResponse {
                    status: ack.disposition,
                    job_id: ack.job_id,
                    case_number: ack.case_number,
                    artifact: ack.artifact,
                }),
            )
                .into_response()
        }
        Err(DispatchError::InvalidRequest(msg)) => error_response(StatusCode::BAD_REQUEST, msg),
        Err(DispatchError::ShuttingDown) => {
            warn!(case_number = %case_number, "Rejected request during shutdown");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Service is shutting down")
        }
        Err(DispatchError::Store(e)) => {
            error!(case_number = %case_number, error = %e, "Record store unavailable");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to check case record: {}", e),
            )
        }
    }
}

/// List case records, most recent download first
pub async fn list_cases(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListCasesParams>,
) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let store = state.case_store();
    let cases = match store.list(limit, offset) {
        Ok(cases) => cases,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to list cases: {}", e),
            )
        }
    };
    let total = match store.count() {
        Ok(total) => total,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to count cases: {}", e),
            )
        }
    };

    Json(ListCasesResponse {
        cases,
        total,
        limit,
        offset,
    })
    .into_response()
}

/// Get a case record and whether its artifact is present
pub async fn get_case(
    State(state): State<Arc<AppState>>,
    Path(case_number): Path<String>,
) -> Response {
    let case_number = match CaseNumber::parse(&case_number) {
        Ok(case_number) => case_number.to_string(),
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let orchestrator = state.orchestrator();
    let reconciliation = match orchestrator.reconcile(&case_number) {
        Ok(reconciliation) => reconciliation,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to reconcile case: {}", e),
            )
        }
    };

    let state_name = reconciliation.as_str().to_string();
    let (record, artifact) = match reconciliation {
        Reconciliation::Satisfied(record) => {
            let artifact = orchestrator.stored_artifact(&record.file_name);
            (record, Some(artifact))
        }
        Reconciliation::Stale(record) => (record, None),
        Reconciliation::NotFound => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("Case not found: {}", case_number),
            )
        }
    };

    Json(CaseDetailResponse {
        record,
        state: state_name,
        artifact,
    })
    .into_response()
}
