//! Dispatcher status handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use dossier_core::{AcquisitionJob, CaseNumber, DispatcherStatus};

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

/// Running and queued jobs, plus retained results
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<DispatcherStatus> {
    Json(state.dispatcher().status().await)
}

/// Job for one case, if one is queued, running or retained
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(case_number): Path<String>,
) -> Result<Json<AcquisitionJob>, (StatusCode, Json<JobErrorResponse>)> {
    let case_number = CaseNumber::parse(&case_number)
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(JobErrorResponse {
                    error: e.to_string(),
                }),
            )
        })?
        .to_string();

    state.dispatcher().job(&case_number).await.map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(JobErrorResponse {
                error: format!("No job for case: {}", case_number),
            }),
        )
    })
}
