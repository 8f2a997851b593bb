//! Case record storage trait.

use thiserror::Error;

use super::{CaseRecord, NewCaseRecord, Reconciliation, RecordUpdate};

/// Error type for case record operations.
#[derive(Debug, Error)]
pub enum CaseStoreError {
    /// A record for this case number already exists.
    #[error("Case already recorded: {0}")]
    DuplicateKey(String),

    #[error("Case not found: {0}")]
    NotFound(String),

    #[error("Invalid case record: {0}")]
    InvalidRecord(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Trait for case record storage backends.
///
/// The uniqueness of `case_number` is enforced by the backend; `insert` is
/// the single source of truth for whether a case was ever recorded.
pub trait CaseStore: Send + Sync {
    /// Whether any record exists for the case.
    fn exists(&self, case_number: &str) -> Result<bool, CaseStoreError>;

    /// Get the record for a case.
    fn get(&self, case_number: &str) -> Result<Option<CaseRecord>, CaseStoreError>;

    /// Insert a new record. Fails with `DuplicateKey` if one already exists;
    /// never overwrites.
    fn insert(&self, record: NewCaseRecord) -> Result<CaseRecord, CaseStoreError>;

    /// Update an existing record in place.
    fn update_status(
        &self,
        case_number: &str,
        update: RecordUpdate,
    ) -> Result<CaseRecord, CaseStoreError>;

    /// List records, most recently downloaded first.
    fn list(&self, limit: i64, offset: i64) -> Result<Vec<CaseRecord>, CaseStoreError>;

    /// Count all records.
    fn count(&self) -> Result<i64, CaseStoreError>;

    /// Classify a case against artifact storage.
    ///
    /// `artifact_present` is called with the record's file name and reports
    /// whether the artifact exists on durable storage.
    fn reconcile(
        &self,
        case_number: &str,
        artifact_present: &dyn Fn(&str) -> bool,
    ) -> Result<Reconciliation, CaseStoreError> {
        match self.get(case_number)? {
            None => Ok(Reconciliation::NotFound),
            Some(record) if record.is_completed() && artifact_present(&record.file_name) => {
                Ok(Reconciliation::Satisfied(record))
            }
            Some(record) => Ok(Reconciliation::Stale(record)),
        }
    }
}
