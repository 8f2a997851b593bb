pub mod audit;
pub mod case;
pub mod config;
pub mod dispatcher;
pub mod metrics;
pub mod notify;
pub mod orchestrator;
pub mod session;
pub mod storage;
pub mod testing;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditEventEnvelope, AuditFilter, AuditHandle,
    AuditOrder, AuditPage, AuditRecord, AuditStore, AuditWriter, CaseTimeline, LastOutcome,
    SqliteAuditStore,
};
pub use case::{
    CaseNumber, CaseNumberError, CaseRecord, CaseStore, CaseStoreError, NewCaseRecord,
    ProcessingStatus, Reconciliation, RecordUpdate, SqliteCaseStore,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use dispatcher::{
    AcquisitionJob, AcquisitionRequest, Acknowledgment, DispatchError, DispatcherStatus,
    Disposition, JobDispatcher, JobHandle, JobResult, JobStatus,
};
pub use notify::{NotificationPayload, Notifier, NotifyError, WebhookNotifier};
pub use orchestrator::{
    AcquisitionFailure, AcquisitionOutcome, AcquisitionStep, ArtifactSource, FailureCause,
    Orchestrator, StoredArtifact,
};
pub use session::{SessionDriver, SessionError, SessionFactory, WebDriverSessionFactory};
pub use storage::{ArtifactStore, StorageError};
