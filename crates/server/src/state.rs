use std::sync::Arc;

use dossier_core::{
    AuditStore, CaseStore, Config, JobDispatcher, Orchestrator, SanitizedConfig,
};

/// Shared application state
pub struct AppState {
    config: Config,
    dispatcher: JobDispatcher,
    orchestrator: Arc<Orchestrator>,
    case_store: Arc<dyn CaseStore>,
    audit_store: Arc<dyn AuditStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        dispatcher: JobDispatcher,
        orchestrator: Arc<Orchestrator>,
        case_store: Arc<dyn CaseStore>,
        audit_store: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            orchestrator,
            case_store,
            audit_store,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn dispatcher(&self) -> &JobDispatcher {
        &self.dispatcher
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn case_store(&self) -> &dyn CaseStore {
        self.case_store.as_ref()
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }
}
