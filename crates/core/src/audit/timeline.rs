//! Per-case summary built from audit events.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{AuditEvent, AuditRecord};

/// How the most recent acquisition of a case ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum LastOutcome {
    Completed {
        file_name: String,
        at: DateTime<Utc>,
    },
    ShortCircuited {
        file_name: String,
        at: DateTime<Utc>,
    },
    Failed {
        step: String,
        cause: String,
        at: DateTime<Utc>,
    },
}

/// Everything the audit trail knows about one case, oldest event first.
#[derive(Debug, Clone, Serialize)]
pub struct CaseTimeline {
    pub case_number: String,
    /// Requests received, whatever their disposition.
    pub requests: usize,
    /// Step attempts that failed and were tried again.
    pub retries: usize,
    pub failures: usize,
    pub last_outcome: Option<LastOutcome>,
    pub events: Vec<AuditRecord>,
}

impl CaseTimeline {
    /// Summarize `events`, which must be in chronological order.
    pub fn from_events(case_number: impl Into<String>, events: Vec<AuditRecord>) -> Self {
        let mut timeline = Self {
            case_number: case_number.into(),
            requests: 0,
            retries: 0,
            failures: 0,
            last_outcome: None,
            events: Vec::new(),
        };

        for record in &events {
            let at = record.timestamp;
            match &record.data {
                AuditEvent::AcquisitionRequested { .. } => timeline.requests += 1,
                AuditEvent::StepRetried { .. } => timeline.retries += 1,
                AuditEvent::AcquisitionCompleted { file_name, .. } => {
                    timeline.last_outcome = Some(LastOutcome::Completed {
                        file_name: file_name.clone(),
                        at,
                    });
                }
                AuditEvent::AcquisitionShortCircuited { file_name, .. } => {
                    timeline.last_outcome = Some(LastOutcome::ShortCircuited {
                        file_name: file_name.clone(),
                        at,
                    });
                }
                AuditEvent::AcquisitionFailed { step, cause, .. } => {
                    timeline.failures += 1;
                    timeline.last_outcome = Some(LastOutcome::Failed {
                        step: step.clone(),
                        cause: cause.clone(),
                        at,
                    });
                }
                _ => {}
            }
        }

        timeline.events = events;
        timeline
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
