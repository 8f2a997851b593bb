//! Acquisition orchestrator implementation.
//!
//! One call to [`Orchestrator::run`] drives a single case through:
//!
//! ```text
//! CheckingRecord -> SessionInit -> Authenticating -> Navigating -> Searching
//!   -> LocatingResult -> Downloading (+ Verifying) -> Persisting -> Cleanup
//! ```
//!
//! A satisfied record short-circuits before any session is created. Session
//! steps are retried with exponential backoff; the whole run is bounded by the
//! overall deadline, and the session is closed on every exit path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::audit::{emit_to, AuditEvent, AuditHandle};
use crate::case::{CaseStore, CaseStoreError, NewCaseRecord, Reconciliation, RecordUpdate};
use crate::config::{AcquisitionConfig, PortalConfig};
use crate::metrics;
use crate::session::{DiagnosticSnapshot, PageState, SessionDriver, SessionFactory, SessionGuard};
use crate::storage::ArtifactStore;

use super::script::PortalScript;
use super::types::{
    AcquisitionFailure, AcquisitionOutcome, AcquisitionStep, ArtifactSource, FailureCause,
    StoredArtifact,
};

/// Login page load, SSO frame, login form and login confirmation.
const AUTHENTICATION_WAITS: u32 = 4;

/// Result link, then the case window it opens.
const LOCATING_WAITS: u32 = 2;

/// Per-run mutable state.
struct RunContext {
    case_number: String,
    run_id: String,
    file_name: String,
    step: AcquisitionStep,
    /// Verified download waiting to be persisted.
    staged: Option<PathBuf>,
    /// Where an unpersisted artifact was moved.
    quarantined: Option<PathBuf>,
}

impl RunContext {
    fn new(case_number: &str, file_name: String) -> Self {
        Self {
            case_number: case_number.to_string(),
            run_id: uuid::Uuid::new_v4().to_string(),
            file_name,
            step: AcquisitionStep::CheckingRecord,
            staged: None,
            quarantined: None,
        }
    }

    fn fail(&self, cause: FailureCause, message: impl Into<String>) -> AcquisitionFailure {
        AcquisitionFailure::new(cause, self.step, message)
    }
}

/// Drives acquisition runs. Cheap to share behind an `Arc`; every run
/// creates its own session.
pub struct Orchestrator {
    config: AcquisitionConfig,
    script: PortalScript,
    sessions: Arc<dyn SessionFactory>,
    store: Arc<dyn CaseStore>,
    artifacts: Arc<ArtifactStore>,
    audit: Option<AuditHandle>,
}

impl Orchestrator {
    pub fn new(
        config: AcquisitionConfig,
        portal: PortalConfig,
        sessions: Arc<dyn SessionFactory>,
        store: Arc<dyn CaseStore>,
        artifacts: Arc<ArtifactStore>,
        audit: Option<AuditHandle>,
    ) -> Self {
        Self {
            config,
            script: PortalScript::new(portal),
            sessions,
            store,
            artifacts,
            audit,
        }
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Classify a case against the record store and artifact storage.
    pub fn reconcile(&self, case_number: &str) -> Result<Reconciliation, CaseStoreError> {
        self.store
            .reconcile(case_number, &|file_name| self.artifacts.contains(file_name))
    }

    /// Describe a stored artifact by file name.
    pub fn stored_artifact(&self, file_name: &str) -> StoredArtifact {
        StoredArtifact {
            file_name: file_name.to_string(),
            path: self.artifacts.artifact_path(file_name),
            url: self.artifacts.public_url(file_name),
        }
    }

    /// Run one acquisition to completion. Never panics on portal or storage
    /// failures; they are reported as `AcquisitionOutcome::Failed`.
    pub async fn run(&self, case_number: &str) -> AcquisitionOutcome {
        let started = Instant::now();
        let mut ctx = RunContext::new(case_number, self.artifacts.file_name_for(case_number));
        let mut session: Option<SessionGuard> = None;

        info!(case_number, run_id = %ctx.run_id, "Starting acquisition");

        let deadline = self.config.overall_deadline();
        let timed = timeout(deadline, self.drive(&mut ctx, &mut session)).await;

        let result = match timed {
            Ok(result) => result,
            Err(_) => Err(ctx.fail(
                FailureCause::DeadlineExceeded,
                format!("run exceeded overall deadline of {:?}", deadline),
            )),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(mut failure) => {
                self.capture_failure(&ctx, &mut session, &mut failure).await;
                failure.into()
            }
        };

        ctx.step = AcquisitionStep::Cleanup;
        self.release(&ctx, session).await;
        self.record(&ctx, &outcome, started.elapsed()).await;
        outcome
    }

    async fn drive(
        &self,
        ctx: &mut RunContext,
        session: &mut Option<SessionGuard>,
    ) -> Result<AcquisitionOutcome, AcquisitionFailure> {
        ctx.step = AcquisitionStep::CheckingRecord;
        let has_record = match self.reconcile(&ctx.case_number) {
            Ok(Reconciliation::Satisfied(record)) => {
                info!(
                    case_number = %ctx.case_number,
                    file_name = %record.file_name,
                    "Case already acquired, skipping session"
                );
                emit_to(
                    &self.audit,
                    AuditEvent::AcquisitionShortCircuited {
                        case_number: ctx.case_number.clone(),
                        file_name: record.file_name.clone(),
                    },
                )
                .await;
                return Ok(AcquisitionOutcome::AlreadySatisfied {
                    artifact: self.stored_artifact(&record.file_name),
                });
            }
            Ok(Reconciliation::Stale(record)) => {
                warn!(
                    case_number = %ctx.case_number,
                    file_name = %record.file_name,
                    status = %record.processing_status,
                    "Record has no artifact, re-acquiring"
                );
                metrics::STALE_RECORDS.inc();
                emit_to(
                    &self.audit,
                    AuditEvent::StaleRecordDetected {
                        case_number: ctx.case_number.clone(),
                        file_name: record.file_name,
                    },
                )
                .await;
                true
            }
            Ok(Reconciliation::NotFound) => false,
            Err(e) => return Err(ctx.fail(FailureCause::PersistenceUnavailable, e.to_string())),
        };

        if self.artifacts.recovered(&ctx.file_name).is_some() {
            ctx.step = AcquisitionStep::Persisting;
            match self.artifacts.restore_recovered(&ctx.file_name) {
                Ok(path) => {
                    info!(
                        case_number = %ctx.case_number,
                        path = %path.display(),
                        "Restored artifact from an earlier run, skipping session"
                    );
                    return self.persist(ctx, has_record, path, ArtifactSource::Recovered);
                }
                Err(e) => warn!(
                    case_number = %ctx.case_number,
                    "Recovered artifact unusable, running full acquisition: {}",
                    e
                ),
            }
        }

        let guard = session.insert(SessionGuard::new(self.sessions.create()));
        for step in AcquisitionStep::SESSION_STEPS {
            self.run_step(ctx, step, guard).await?;
        }

        let staged = ctx
            .staged
            .take()
            .ok_or_else(|| ctx.fail(FailureCause::Internal, "download produced no artifact"))?;
        self.persist(ctx, has_record, staged, ArtifactSource::Downloaded)
    }

    /// Run one step with retry and backoff.
    async fn run_step(
        &self,
        ctx: &mut RunContext,
        step: AcquisitionStep,
        guard: &mut SessionGuard,
    ) -> Result<(), AcquisitionFailure> {
        ctx.step = step;
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 1;

        loop {
            debug!(case_number = %ctx.case_number, step = %step, attempt, "Attempting step");

            match self.attempt(ctx, step, guard).await {
                Ok(()) => {
                    if step == AcquisitionStep::SessionInit {
                        metrics::SESSIONS_OPENED.inc();
                    }
                    return Ok(());
                }
                Err(failure) if failure.cause.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.backoff_for(attempt);
                    warn!(
                        case_number = %ctx.case_number,
                        step = %step,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Step failed, retrying: {}",
                        failure.message
                    );
                    metrics::STEP_RETRIES
                        .with_label_values(&[step.as_str()])
                        .inc();
                    emit_to(
                        &self.audit,
                        AuditEvent::StepRetried {
                            case_number: ctx.case_number.clone(),
                            step: step.as_str().to_string(),
                            attempt,
                            error: failure.message.clone(),
                        },
                    )
                    .await;
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure),
            }
        }
    }

    /// Outer bound for one attempt of `step`. Steps whose driver calls wait
    /// several times get one step timeout per wait, so a driver-reported
    /// error always arrives before the bound does.
    fn step_bound(&self, step: AcquisitionStep) -> Duration {
        let step_timeout = self.config.step_timeout();
        match step {
            AcquisitionStep::Authenticating => step_timeout * AUTHENTICATION_WAITS,
            AcquisitionStep::LocatingResult => step_timeout * LOCATING_WAITS,
            AcquisitionStep::Downloading => step_timeout + self.config.download_timeout(),
            _ => step_timeout,
        }
    }

    /// A single attempt of a session step, bounded by [`Self::step_bound`].
    async fn attempt(
        &self,
        ctx: &mut RunContext,
        step: AcquisitionStep,
        guard: &mut SessionGuard,
    ) -> Result<(), AcquisitionFailure> {
        let step_timeout = self.config.step_timeout();
        let bound = self.step_bound(step);

        if step == AcquisitionStep::SessionInit {
            let result = timeout(bound, guard.open()).await;
            return settle(step, bound, result);
        }

        let driver = guard
            .driver_mut()
            .map_err(|e| AcquisitionFailure::from_session(step, &e))?;

        let result = match step {
            AcquisitionStep::Authenticating => {
                timeout(bound, self.script.authenticate(driver)).await
            }
            AcquisitionStep::Navigating => {
                timeout(bound, self.script.open_search(driver, step_timeout)).await
            }
            AcquisitionStep::Searching => {
                timeout(bound, self.script.search(driver, &ctx.case_number)).await
            }
            AcquisitionStep::LocatingResult => {
                timeout(
                    bound,
                    self.script
                        .open_result(driver, &ctx.case_number, step_timeout),
                )
                .await
            }
            AcquisitionStep::Downloading => return self.attempt_download(ctx, driver, bound).await,
            other => {
                return Err(AcquisitionFailure::new(
                    FailureCause::Internal,
                    other,
                    "not a session step",
                ))
            }
        };

        settle(step, bound, result)
    }

    /// Download into staging, then verify. A verification failure counts as
    /// a failed download attempt.
    async fn attempt_download(
        &self,
        ctx: &mut RunContext,
        driver: &mut dyn SessionDriver,
        bound: Duration,
    ) -> Result<(), AcquisitionFailure> {
        let step = AcquisitionStep::Downloading;
        let destination = self
            .artifacts
            .staging_path(&ctx.run_id, &ctx.file_name)
            .map_err(|e| ctx.fail(FailureCause::Internal, e.to_string()))?;

        let download = self.script.download(
            driver,
            destination,
            self.config.step_timeout(),
            self.config.download_timeout(),
        );
        let downloaded = match timeout(bound, download).await {
            Ok(Ok(path)) => path,
            Ok(Err(e)) => return Err(AcquisitionFailure::from_session(step, &e)),
            Err(_) => {
                return Err(AcquisitionFailure::new(
                    FailureCause::InteractionTimeout,
                    step,
                    format!("download did not complete within {:?}", bound),
                ))
            }
        };

        ctx.step = AcquisitionStep::Verifying;
        let verified = self.artifacts.verify_staged(&downloaded, &ctx.file_name);
        ctx.step = step;

        match verified {
            Ok(bytes) => {
                debug!(case_number = %ctx.case_number, bytes, "Artifact verified");
                ctx.staged = Some(downloaded);
                Ok(())
            }
            Err(e) => {
                warn!(case_number = %ctx.case_number, "Downloaded artifact rejected: {}", e);
                Err(AcquisitionFailure::new(
                    FailureCause::DownloadVerificationFailed,
                    step,
                    e.to_string(),
                ))
            }
        }
    }

    /// Store the artifact and write the record. Synchronous, so a deadline
    /// can never interrupt it halfway.
    fn persist(
        &self,
        ctx: &mut RunContext,
        has_record: bool,
        artifact_path: PathBuf,
        source: ArtifactSource,
    ) -> Result<AcquisitionOutcome, AcquisitionFailure> {
        ctx.step = AcquisitionStep::Persisting;
        let file_name = ctx.file_name.clone();

        let path = match source {
            ArtifactSource::Recovered => artifact_path,
            ArtifactSource::Downloaded => {
                match self.artifacts.promote(&artifact_path, &file_name) {
                    Ok(path) => path,
                    Err(e) => {
                        let message = self.quarantine(ctx, &artifact_path, &e.to_string());
                        return Err(ctx.fail(FailureCause::PersistenceUnavailable, message));
                    }
                }
            }
        };

        let written = if has_record {
            match self
                .store
                .update_status(&ctx.case_number, RecordUpdate::completed(&file_name))
            {
                Ok(_) => Ok(true),
                Err(CaseStoreError::NotFound(_)) => self
                    .store
                    .insert(NewCaseRecord::completed(&ctx.case_number, &file_name))
                    .map(|_| false),
                Err(e) => Err(e),
            }
        } else {
            self.store
                .insert(NewCaseRecord::completed(&ctx.case_number, &file_name))
                .map(|_| false)
        };

        let artifact = StoredArtifact {
            file_name: file_name.clone(),
            url: self.artifacts.public_url(&file_name),
            path,
        };

        match written {
            Ok(refreshed) => Ok(AcquisitionOutcome::Acquired {
                artifact,
                source,
                refreshed,
            }),
            Err(CaseStoreError::DuplicateKey(_)) => {
                info!(
                    case_number = %ctx.case_number,
                    "Case was recorded concurrently, treating as already satisfied"
                );
                Ok(AcquisitionOutcome::AlreadySatisfied { artifact })
            }
            Err(e) => {
                let message = self.quarantine(ctx, &artifact.path, &e.to_string());
                Err(ctx.fail(FailureCause::PersistenceUnavailable, message))
            }
        }
    }

    /// Move an unpersisted artifact to `recovered/`; returns the failure message.
    fn quarantine(&self, ctx: &mut RunContext, path: &std::path::Path, reason: &str) -> String {
        match self.artifacts.quarantine(path) {
            Ok(kept) => {
                let message = format!("{}; artifact kept at {}", reason, kept.display());
                ctx.quarantined = Some(kept);
                message
            }
            Err(e) => format!("{}; artifact could not be kept: {}", reason, e),
        }
    }

    /// Log the failure and write a diagnostic snapshot, including the page
    /// state when a session is open.
    async fn capture_failure(
        &self,
        ctx: &RunContext,
        session: &mut Option<SessionGuard>,
        failure: &mut AcquisitionFailure,
    ) {
        error!(
            case_number = %ctx.case_number,
            step = %failure.step,
            cause = %failure.cause,
            "Acquisition failed: {}",
            failure.message
        );

        let mut page = PageState::default();
        if let Some(guard) = session.as_mut().filter(|g| g.is_open()) {
            if let Ok(driver) = guard.driver_mut() {
                match timeout(self.config.step_timeout(), driver.capture_diagnostic()).await {
                    Ok(Ok(state)) => page = state,
                    Ok(Err(e)) => warn!(case_number = %ctx.case_number, "Diagnostic capture failed: {}", e),
                    Err(_) => warn!(case_number = %ctx.case_number, "Diagnostic capture timed out"),
                }
            }
        }

        let snapshot = DiagnosticSnapshot::new(
            &ctx.case_number,
            failure.step.as_str(),
            failure.to_string(),
            page,
        );
        match self.artifacts.write_diagnostic(&snapshot) {
            Ok(path) => {
                debug!(path = %path.display(), "Diagnostic snapshot written");
                failure.diagnostic = Some(path);
            }
            Err(e) => warn!(case_number = %ctx.case_number, "Failed to write diagnostic: {}", e),
        }
    }

    /// Close the session and drop the run's staging area.
    async fn release(&self, ctx: &RunContext, session: Option<SessionGuard>) {
        if let Some(guard) = session {
            match timeout(self.config.step_timeout(), guard.close()).await {
                Ok(Ok(())) => debug!(case_number = %ctx.case_number, "Session released"),
                Ok(Err(e)) => warn!(case_number = %ctx.case_number, "Session close failed: {}", e),
                Err(_) => warn!(case_number = %ctx.case_number, "Session close timed out"),
            }
        }
        self.artifacts.discard_staging(&ctx.run_id);
    }

    async fn record(&self, ctx: &RunContext, outcome: &AcquisitionOutcome, elapsed: Duration) {
        let label = outcome.label();
        metrics::ACQUISITIONS_TOTAL.with_label_values(&[label]).inc();
        metrics::ACQUISITION_DURATION
            .with_label_values(&[label])
            .observe(elapsed.as_secs_f64());

        match outcome {
            AcquisitionOutcome::AlreadySatisfied { .. } => {}
            AcquisitionOutcome::Acquired {
                artifact,
                source,
                refreshed,
            } => {
                info!(
                    case_number = %ctx.case_number,
                    file_name = %artifact.file_name,
                    refreshed,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Acquisition completed"
                );
                emit_to(
                    &self.audit,
                    AuditEvent::AcquisitionCompleted {
                        case_number: ctx.case_number.clone(),
                        file_name: artifact.file_name.clone(),
                        recovered: *source == ArtifactSource::Recovered,
                        refreshed: *refreshed,
                        duration_ms: elapsed.as_millis() as u64,
                    },
                )
                .await;
            }
            AcquisitionOutcome::Failed { failure } => {
                metrics::ACQUISITION_FAILURES
                    .with_label_values(&[failure.cause.as_str(), failure.step.as_str()])
                    .inc();
                if let Some(ref kept) = ctx.quarantined {
                    emit_to(
                        &self.audit,
                        AuditEvent::ArtifactQuarantined {
                            case_number: ctx.case_number.clone(),
                            path: kept.display().to_string(),
                        },
                    )
                    .await;
                }
                emit_to(
                    &self.audit,
                    AuditEvent::AcquisitionFailed {
                        case_number: ctx.case_number.clone(),
                        step: failure.step.as_str().to_string(),
                        cause: failure.cause.as_str().to_string(),
                        error: failure.message.clone(),
                        diagnostic_path: failure
                            .diagnostic
                            .as_ref()
                            .map(|p| p.display().to_string()),
                    },
                )
                .await;
            }
        }
    }
}

/// Turn a bounded session call into a step result.
fn settle(
    step: AcquisitionStep,
    bound: Duration,
    result: Result<Result<(), crate::session::SessionError>, tokio::time::error::Elapsed>,
) -> Result<(), AcquisitionFailure> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(AcquisitionFailure::from_session(step, &e)),
        Err(_) => Err(AcquisitionFailure::new(
            FailureCause::InteractionTimeout,
            step,
            format!("no progress within {:?}", bound),
        )),
    }
}
