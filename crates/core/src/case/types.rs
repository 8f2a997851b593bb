//! Case record types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of a case record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(format!("unknown processing status: {}", other)),
        }
    }
}

/// Persisted knowledge that a case's document has been (or is being) acquired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_number: String,
    /// Name of the stored artifact, relative to the artifact directory.
    pub file_name: String,
    /// When the artifact was last acquired successfully.
    pub download_date: Option<DateTime<Utc>>,
    pub processing_status: ProcessingStatus,
    /// Text extracted from the artifact by a later stage.
    pub extracted_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CaseRecord {
    pub fn is_completed(&self) -> bool {
        self.processing_status == ProcessingStatus::Completed
    }
}

/// A record to insert.
#[derive(Debug, Clone)]
pub struct NewCaseRecord {
    pub case_number: String,
    pub file_name: String,
    pub download_date: Option<DateTime<Utc>>,
    pub processing_status: ProcessingStatus,
}

impl NewCaseRecord {
    /// A record for an artifact acquired just now.
    pub fn completed(case_number: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            case_number: case_number.into(),
            file_name: file_name.into(),
            download_date: Some(Utc::now()),
            processing_status: ProcessingStatus::Completed,
        }
    }
}

/// In-place update of an existing record. `updated_at` is always refreshed.
#[derive(Debug, Clone)]
pub struct RecordUpdate {
    pub status: ProcessingStatus,
    pub file_name: Option<String>,
    pub download_date: Option<DateTime<Utc>>,
    pub extracted_text: Option<String>,
}

impl RecordUpdate {
    pub fn status(status: ProcessingStatus) -> Self {
        Self {
            status,
            file_name: None,
            download_date: None,
            extracted_text: None,
        }
    }

    /// Mark the record completed with a freshly acquired artifact.
    pub fn completed(file_name: impl Into<String>) -> Self {
        Self {
            status: ProcessingStatus::Completed,
            file_name: Some(file_name.into()),
            download_date: Some(Utc::now()),
            extracted_text: None,
        }
    }

    pub fn with_extracted_text(mut self, text: impl Into<String>) -> Self {
        self.extracted_text = Some(text.into());
        self
    }
}

/// Result of reconciling a record against artifact storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// A completed record exists and its artifact is present.
    Satisfied(CaseRecord),
    /// A record exists but is not backed by an artifact (or never completed).
    /// Re-acquisition must update this record, not insert a new one.
    Stale(CaseRecord),
    /// No record exists for the case.
    NotFound,
}

impl Reconciliation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reconciliation::Satisfied(_) => "satisfied",
            Reconciliation::Stale(_) => "stale",
            Reconciliation::NotFound => "not_found",
        }
    }

    pub fn record(&self) -> Option<&CaseRecord> {
        match self {
            Reconciliation::Satisfied(record) | Reconciliation::Stale(record) => Some(record),
            Reconciliation::NotFound => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_and_display() {
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ProcessingStatus>(), Ok(status));
        }
        assert!("done".parse::<ProcessingStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ProcessingStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }

    #[test]
    fn test_completed_update_sets_download_date() {
        let update = RecordUpdate::completed("0001.pdf");
        assert_eq!(update.status, ProcessingStatus::Completed);
        assert_eq!(update.file_name.as_deref(), Some("0001.pdf"));
        assert!(update.download_date.is_some());
    }
}
