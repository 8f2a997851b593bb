//! Types for the acquisition orchestrator.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionError;

/// States of one acquisition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionStep {
    CheckingRecord,
    SessionInit,
    Authenticating,
    Navigating,
    Searching,
    LocatingResult,
    Downloading,
    Verifying,
    Persisting,
    Cleanup,
}

impl AcquisitionStep {
    /// Steps that talk to the portal, in order.
    pub const SESSION_STEPS: [AcquisitionStep; 6] = [
        AcquisitionStep::SessionInit,
        AcquisitionStep::Authenticating,
        AcquisitionStep::Navigating,
        AcquisitionStep::Searching,
        AcquisitionStep::LocatingResult,
        AcquisitionStep::Downloading,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionStep::CheckingRecord => "checking_record",
            AcquisitionStep::SessionInit => "session_init",
            AcquisitionStep::Authenticating => "authenticating",
            AcquisitionStep::Navigating => "navigating",
            AcquisitionStep::Searching => "searching",
            AcquisitionStep::LocatingResult => "locating_result",
            AcquisitionStep::Downloading => "downloading",
            AcquisitionStep::Verifying => "verifying",
            AcquisitionStep::Persisting => "persisting",
            AcquisitionStep::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for AcquisitionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The portal refused the credentials. Never retried.
    AuthenticationRejected,
    /// A wait exceeded the per-step timeout.
    InteractionTimeout,
    /// An expected element or window never appeared.
    ElementNotFound,
    /// The downloaded artifact was missing, empty or misnamed.
    DownloadVerificationFailed,
    /// The driver or portal could not be reached.
    Transport,
    /// The record store could not be read or written.
    PersistenceUnavailable,
    /// The run exceeded its overall deadline.
    DeadlineExceeded,
    /// The service shut down before the run finished.
    Shutdown,
    /// Unexpected failure (panic, local I/O).
    Internal,
}

impl FailureCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCause::AuthenticationRejected => "authentication_rejected",
            FailureCause::InteractionTimeout => "interaction_timeout",
            FailureCause::ElementNotFound => "element_not_found",
            FailureCause::DownloadVerificationFailed => "download_verification_failed",
            FailureCause::Transport => "transport",
            FailureCause::PersistenceUnavailable => "persistence_unavailable",
            FailureCause::DeadlineExceeded => "deadline_exceeded",
            FailureCause::Shutdown => "shutdown",
            FailureCause::Internal => "internal",
        }
    }

    /// Whether the failing step may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureCause::InteractionTimeout
                | FailureCause::ElementNotFound
                | FailureCause::DownloadVerificationFailed
                | FailureCause::Transport
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FailureCause::InteractionTimeout | FailureCause::DeadlineExceeded
        )
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&SessionError> for FailureCause {
    fn from(e: &SessionError) -> Self {
        match e {
            SessionError::Timeout(_) => FailureCause::InteractionTimeout,
            SessionError::NotFound(_) => FailureCause::ElementNotFound,
            SessionError::Rejected(_) => FailureCause::AuthenticationRejected,
            SessionError::Transport(_) => FailureCause::Transport,
        }
    }
}

/// Terminal failure of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{step} failed ({cause}): {message}")]
pub struct AcquisitionFailure {
    pub cause: FailureCause,
    pub step: AcquisitionStep,
    pub message: String,
    /// Snapshot written for this failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<PathBuf>,
}

impl AcquisitionFailure {
    pub fn new(cause: FailureCause, step: AcquisitionStep, message: impl Into<String>) -> Self {
        Self {
            cause,
            step,
            message: message.into(),
            diagnostic: None,
        }
    }

    pub fn from_session(step: AcquisitionStep, error: &SessionError) -> Self {
        Self::new(FailureCause::from(error), step, error.to_string())
    }
}

/// Where a persisted artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSource {
    /// Fetched by a portal session in this run.
    Downloaded,
    /// Restored from an earlier run whose record could not be written.
    Recovered,
}

/// An artifact in durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub file_name: String,
    pub path: PathBuf,
    pub url: String,
}

/// Terminal result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AcquisitionOutcome {
    /// The case was already recorded with its artifact; no session opened.
    AlreadySatisfied { artifact: StoredArtifact },
    /// The artifact was stored and the record written.
    Acquired {
        artifact: StoredArtifact,
        source: ArtifactSource,
        /// An existing (stale) record was updated rather than inserted.
        refreshed: bool,
    },
    Failed { failure: AcquisitionFailure },
}

impl AcquisitionOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, AcquisitionOutcome::Failed { .. })
    }

    pub fn artifact(&self) -> Option<&StoredArtifact> {
        match self {
            AcquisitionOutcome::AlreadySatisfied { artifact }
            | AcquisitionOutcome::Acquired { artifact, .. } => Some(artifact),
            AcquisitionOutcome::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&AcquisitionFailure> {
        match self {
            AcquisitionOutcome::Failed { failure } => Some(failure),
            _ => None,
        }
    }

    /// Label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            AcquisitionOutcome::AlreadySatisfied { .. } => "already_satisfied",
            AcquisitionOutcome::Acquired { .. } => "acquired",
            AcquisitionOutcome::Failed { .. } => "failed",
        }
    }
}

impl From<AcquisitionFailure> for AcquisitionOutcome {
    fn from(failure: AcquisitionFailure) -> Self {
        AcquisitionOutcome::Failed { failure }
    }
}
