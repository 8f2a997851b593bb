use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::orchestrator::{AcquisitionStep, FailureCause};

use super::AuditRecord;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Event types that describe something going wrong with an acquisition.
pub const TROUBLE_EVENT_TYPES: [&str; 4] = [
    "step_retried",
    "acquisition_failed",
    "artifact_quarantined",
    "notification_failed",
];

/// Which events a query selects. Paging and order are passed separately.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub case_number: Option<String>,
    /// Any of these event types; empty selects every type.
    pub event_types: Vec<String>,
    /// Step recorded by `step_retried` and `acquisition_failed` events.
    pub step: Option<AcquisitionStep>,
    /// Cause recorded by `acquisition_failed` events.
    pub cause: Option<FailureCause>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded about one case.
    pub fn for_case(case_number: impl Into<String>) -> Self {
        Self {
            case_number: Some(case_number.into()),
            ..Self::default()
        }
    }

    /// Retries, failures, quarantined artifacts and failed notifications.
    pub fn trouble(mut self) -> Self {
        self.event_types = TROUBLE_EVENT_TYPES.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn of_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types.push(event_type.into());
        self
    }

    pub fn at_step(mut self, step: AcquisitionStep) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_cause(mut self, cause: FailureCause) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn between(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }
}

/// Result order of a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuditOrder {
    #[default]
    NewestFirst,
    /// Oldest first, for reading a case's history top to bottom.
    Chronological,
}

/// One page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditPage {
    pub limit: i64,
    pub offset: i64,
}

impl AuditPage {
    pub const DEFAULT_LIMIT: i64 = 100;
    pub const MAX_LIMIT: i64 = 1000;

    /// Clamp caller-supplied paging into the accepted range.
    pub fn clamped(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for AuditPage {
    fn default() -> Self {
        Self::clamped(None, None)
    }
}

/// Storage for audit events.
pub trait AuditStore: Send + Sync {
    /// Insert an audit record, returns the assigned ID
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError>;

    fn query(
        &self,
        filter: &AuditFilter,
        order: AuditOrder,
        page: AuditPage,
    ) -> Result<Vec<AuditRecord>, AuditError>;

    /// Count matching audit records
    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError>;

    /// The first [`AuditPage::MAX_LIMIT`] events of a case, oldest first.
    fn timeline(&self, case_number: &str) -> Result<Vec<AuditRecord>, AuditError> {
        self.query(
            &AuditFilter::for_case(case_number),
            AuditOrder::Chronological,
            AuditPage::clamped(Some(AuditPage::MAX_LIMIT), None),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamping() {
        assert_eq!(AuditPage::default(), AuditPage { limit: 100, offset: 0 });
        assert_eq!(
            AuditPage::clamped(Some(5000), Some(-3)),
            AuditPage { limit: 1000, offset: 0 }
        );
        assert_eq!(AuditPage::clamped(Some(0), Some(20)).limit, 1);
    }

    #[test]
    fn test_trouble_replaces_event_types() {
        let filter = AuditFilter::new().of_type("service_started").trouble();
        assert_eq!(filter.event_types.len(), TROUBLE_EVENT_TYPES.len());
        assert!(!filter.event_types.iter().any(|t| t == "service_started"));
    }
}
