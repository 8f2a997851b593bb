//! Case records: the durable idempotency layer for acquisitions.

mod number;
mod sqlite_store;
mod store;
mod types;

pub use number::{sanitize_file_stem, CaseNumber, CaseNumberError};
pub use sqlite_store::SqliteCaseStore;
pub use store::{CaseStore, CaseStoreError};
pub use types::{CaseRecord, NewCaseRecord, ProcessingStatus, Reconciliation, RecordUpdate};
