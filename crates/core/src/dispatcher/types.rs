//! Types for the job dispatcher.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::case::CaseStoreError;
use crate::orchestrator::{
    AcquisitionFailure, AcquisitionOutcome, AcquisitionStep, FailureCause, StoredArtifact,
};

/// Errors returned synchronously by `acquire`.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("dispatcher is shutting down")]
    ShuttingDown,

    /// The pre-check against the record store failed.
    #[error("record store error: {0}")]
    Store(#[from] CaseStoreError),
}

/// Request to acquire one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionRequest {
    pub case_number: String,
    /// Per-request notification target; falls back to the configured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

impl AcquisitionRequest {
    pub fn new(case_number: impl Into<String>) -> Self {
        Self {
            case_number: case_number.into(),
            callback_url: None,
        }
    }

    pub fn with_callback(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }
}

/// How a request was taken in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// A new job was created.
    Accepted,
    /// Joined a queued, running or recently finished job for the same case.
    Attached,
    /// Answered from the record store without a job run.
    AlreadySatisfied,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Accepted => "accepted",
            Disposition::Attached => "attached",
            Disposition::AlreadySatisfied => "already_satisfied",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immediate answer to `acquire`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub job_id: String,
    pub case_number: String,
    pub disposition: Disposition,
    /// Present on the synchronous short-circuit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<StoredArtifact>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Result shared by every waiter of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub case_number: String,
    pub outcome: AcquisitionOutcome,
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    pub fn new(job_id: &str, case_number: &str, outcome: AcquisitionOutcome) -> Self {
        Self {
            job_id: job_id.to_string(),
            case_number: case_number.to_string(),
            outcome,
            finished_at: Utc::now(),
        }
    }

    pub fn status(&self) -> JobStatus {
        if self.outcome.is_success() {
            JobStatus::Succeeded
        } else {
            JobStatus::Failed
        }
    }
}

/// Snapshot of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionJob {
    pub id: String,
    pub case_number: String,
    pub status: JobStatus,
    /// Requests sharing this job.
    pub waiters: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<JobResult>,
}

/// Current state of the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherStatus {
    pub running: usize,
    pub queued: usize,
    pub concurrency_limit: usize,
    pub shutting_down: bool,
    pub jobs: Vec<AcquisitionJob>,
}

/// Resolves to the job's shared result.
#[derive(Debug)]
pub struct JobHandle {
    job_id: String,
    case_number: String,
    rx: watch::Receiver<Option<JobResult>>,
}

impl JobHandle {
    pub(crate) fn new(
        job_id: &str,
        case_number: &str,
        rx: watch::Receiver<Option<JobResult>>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            case_number: case_number.to_string(),
            rx,
        }
    }

    /// Handle that is already resolved.
    pub(crate) fn resolved(result: JobResult) -> Self {
        let job_id = result.job_id.clone();
        let case_number = result.case_number.clone();
        let (_tx, rx) = watch::channel(Some(result));
        Self {
            job_id,
            case_number,
            rx,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn case_number(&self) -> &str {
        &self.case_number
    }

    /// The result if the job already finished.
    pub fn try_result(&self) -> Option<JobResult> {
        self.rx.borrow().clone()
    }

    /// Wait for the job to finish.
    pub async fn wait(mut self) -> JobResult {
        loop {
            if let Some(result) = self.rx.borrow_and_update().clone() {
                return result;
            }
            if self.rx.changed().await.is_err() {
                return self.rx.borrow().clone().unwrap_or_else(|| {
                    JobResult::new(
                        &self.job_id,
                        &self.case_number,
                        AcquisitionFailure::new(
                            FailureCause::Internal,
                            AcquisitionStep::Cleanup,
                            "job ended without a result",
                        )
                        .into(),
                    )
                });
            }
        }
    }
}
