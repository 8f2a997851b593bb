use serde::{Deserialize, Serialize};

use crate::orchestrator::AcquisitionOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Success,
    Error,
}

/// Body posted to the notification target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub case_number: String,
    pub status: NotificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NotificationPayload {
    pub fn from_outcome(case_number: &str, outcome: &AcquisitionOutcome) -> Self {
        let mut payload = Self {
            case_number: case_number.to_string(),
            status: NotificationStatus::Success,
            artifact_url: None,
            artifact_path: None,
            error: None,
            message: None,
        };

        match outcome {
            AcquisitionOutcome::AlreadySatisfied { artifact } => {
                payload.artifact_url = Some(artifact.url.clone());
                payload.artifact_path = Some(artifact.path.display().to_string());
                payload.message = Some("Case already acquired".to_string());
            }
            AcquisitionOutcome::Acquired { artifact, .. } => {
                payload.artifact_url = Some(artifact.url.clone());
                payload.artifact_path = Some(artifact.path.display().to_string());
            }
            AcquisitionOutcome::Failed { failure } => {
                payload.status = NotificationStatus::Error;
                payload.error = Some(failure.to_string());
            }
        }

        payload
    }

    pub fn is_success(&self) -> bool {
        self.status == NotificationStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::orchestrator::{
        AcquisitionFailure, AcquisitionStep, ArtifactSource, FailureCause, StoredArtifact,
    };

    fn artifact() -> StoredArtifact {
        StoredArtifact {
            file_name: "0001.pdf".into(),
            path: PathBuf::from("/data/cases/0001.pdf"),
            url: "http://localhost:8080/static/0001.pdf".into(),
        }
    }

    #[test]
    fn test_success_payload() {
        let outcome = AcquisitionOutcome::Acquired {
            artifact: artifact(),
            source: ArtifactSource::Downloaded,
            refreshed: false,
        };
        let payload = NotificationPayload::from_outcome("0001", &outcome);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["status"], "success");
        assert_eq!(json["artifact_url"], "http://localhost:8080/static/0001.pdf");
        assert_eq!(json["artifact_path"], "/data/cases/0001.pdf");
        assert!(json.get("error").is_none());
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_short_circuit_payload_has_message() {
        let outcome = AcquisitionOutcome::AlreadySatisfied { artifact: artifact() };
        let payload = NotificationPayload::from_outcome("0001", &outcome);

        assert!(payload.is_success());
        assert_eq!(payload.message.as_deref(), Some("Case already acquired"));
    }

    #[test]
    fn test_failure_payload() {
        let outcome: AcquisitionOutcome = AcquisitionFailure::new(
            FailureCause::InteractionTimeout,
            AcquisitionStep::LocatingResult,
            "result link never appeared",
        )
        .into();
        let payload = NotificationPayload::from_outcome("0001", &outcome);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["status"], "error");
        assert!(json["error"].as_str().unwrap().contains("interaction_timeout"));
        assert!(json.get("artifact_url").is_none());
    }
}
