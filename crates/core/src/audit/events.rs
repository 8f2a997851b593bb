use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Request intake
    /// A request reached the dispatcher.
    AcquisitionRequested {
        case_number: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<String>,
        /// accepted, attached or already_satisfied
        disposition: String,
    },

    // Acquisition lifecycle
    /// The record was satisfied; no session was opened.
    AcquisitionShortCircuited {
        case_number: String,
        file_name: String,
    },
    /// A record exists but its artifact does not.
    StaleRecordDetected {
        case_number: String,
        file_name: String,
    },
    /// A step failed and will be attempted again.
    StepRetried {
        case_number: String,
        step: String,
        attempt: u32,
        error: String,
    },
    AcquisitionCompleted {
        case_number: String,
        file_name: String,
        /// The artifact came from `recovered/` instead of a new session.
        recovered: bool,
        /// An existing record was updated rather than inserted.
        refreshed: bool,
        duration_ms: u64,
    },
    AcquisitionFailed {
        case_number: String,
        step: String,
        cause: String,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        diagnostic_path: Option<String>,
    },
    /// An artifact was retrieved but its record could not be written.
    ArtifactQuarantined {
        case_number: String,
        path: String,
    },

    // Notifications
    NotificationDelivered {
        case_number: String,
        target: String,
        attempts: u32,
    },
    NotificationFailed {
        case_number: String,
        target: String,
        attempts: u32,
        error: String,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::AcquisitionRequested { .. } => "acquisition_requested",
            Self::AcquisitionShortCircuited { .. } => "acquisition_short_circuited",
            Self::StaleRecordDetected { .. } => "stale_record_detected",
            Self::StepRetried { .. } => "step_retried",
            Self::AcquisitionCompleted { .. } => "acquisition_completed",
            Self::AcquisitionFailed { .. } => "acquisition_failed",
            Self::ArtifactQuarantined { .. } => "artifact_quarantined",
            Self::NotificationDelivered { .. } => "notification_delivered",
            Self::NotificationFailed { .. } => "notification_failed",
        }
    }

    /// Returns the case number if this event is case-related
    pub fn case_number(&self) -> Option<&str> {
        match self {
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
            Self::AcquisitionRequested { case_number, .. }
            | Self::AcquisitionShortCircuited { case_number, .. }
            | Self::StaleRecordDetected { case_number, .. }
            | Self::StepRetried { case_number, .. }
            | Self::AcquisitionCompleted { case_number, .. }
            | Self::AcquisitionFailed { case_number, .. }
            | Self::ArtifactQuarantined { case_number, .. }
            | Self::NotificationDelivered { case_number, .. }
            | Self::NotificationFailed { case_number, .. } => Some(case_number),
        }
    }
}

/// A stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub case_number: Option<String>,
    pub data: AuditEvent,
}
