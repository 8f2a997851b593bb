//! Job dispatcher implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::audit::{emit_to, AuditEvent, AuditHandle};
use crate::case::Reconciliation;
use crate::config::{DispatcherConfig, NotificationConfig};
use crate::metrics;
use crate::notify::{deliver_with_retry, DeliveryPolicy, NotificationPayload, Notifier};
use crate::orchestrator::{
    AcquisitionFailure, AcquisitionOutcome, AcquisitionStep, FailureCause, Orchestrator,
};

use super::types::{
    AcquisitionJob, AcquisitionRequest, Acknowledgment, DispatchError, DispatcherStatus,
    Disposition, JobHandle, JobResult, JobStatus,
};

/// One job and everyone waiting on it.
struct JobEntry {
    job: AcquisitionJob,
    tx: watch::Sender<Option<JobResult>>,
    /// Notification target per attached request, `None` when it has none.
    targets: Vec<Option<String>>,
    abort: Option<AbortHandle>,
}

#[derive(Default)]
struct DispatchState {
    jobs: HashMap<String, JobEntry>,
    /// Case numbers waiting for a slot, in arrival order.
    queue: VecDeque<String>,
    running: usize,
}

struct Inner {
    orchestrator: Arc<Orchestrator>,
    notifier: Arc<dyn Notifier>,
    config: DispatcherConfig,
    notification: NotificationConfig,
    state: Mutex<DispatchState>,
    /// Signalled whenever the last running job finishes.
    idle: Notify,
    /// Cuts retention short on shutdown.
    stopping: Notify,
    shutting_down: AtomicBool,
    audit: Option<AuditHandle>,
}

/// Accepts acquisition requests and runs at most one orchestrator run per
/// case, with bounded concurrency across cases.
///
/// - A satisfied case is answered synchronously without a job.
/// - Requests for a case with a queued, running or recently finished job
///   attach to it and receive its result.
/// - Jobs beyond the concurrency limit wait in FIFO order.
/// - Every attached request is notified once when the job finishes.
#[derive(Clone)]
pub struct JobDispatcher {
    inner: Arc<Inner>,
}

impl JobDispatcher {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        notifier: Arc<dyn Notifier>,
        config: DispatcherConfig,
        notification: NotificationConfig,
        audit: Option<AuditHandle>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                orchestrator,
                notifier,
                config,
                notification,
                state: Mutex::new(DispatchState::default()),
                idle: Notify::new(),
                stopping: Notify::new(),
                shutting_down: AtomicBool::new(false),
                audit,
            }),
        }
    }

    pub fn concurrency_limit(&self) -> usize {
        self.inner.config.concurrency_limit.max(1)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Accept a request. Returns immediately; the handle resolves when the
    /// job finishes.
    pub async fn acquire(
        &self,
        request: AcquisitionRequest,
    ) -> Result<(Acknowledgment, JobHandle), DispatchError> {
        let case_number = request.case_number.trim().to_string();
        if case_number.is_empty() {
            return Err(DispatchError::InvalidRequest(
                "case number must not be empty".to_string(),
            ));
        }
        if self.is_shutting_down() {
            return Err(DispatchError::ShuttingDown);
        }

        let target = request
            .callback_url
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.inner.notification.target.clone());

        if let Reconciliation::Satisfied(record) = self.inner.orchestrator.reconcile(&case_number)? {
            return Ok(self.short_circuit(&case_number, &record.file_name, target).await);
        }

        let mut state = self.inner.state.lock().await;

        // A failed job stays visible for lookup but is never reused; the new
        // job replaces its entry.
        let reusable = state
            .jobs
            .get_mut(&case_number)
            .filter(|entry| entry.job.status != JobStatus::Failed);
        if let Some(entry) = reusable {
            entry.job.waiters += 1;
            let job_id = entry.job.id.clone();
            let handle = JobHandle::new(&job_id, &case_number, entry.tx.subscribe());
            let finished = entry.job.result.clone();
            if finished.is_none() {
                entry.targets.push(target.clone());
            }
            drop(state);

            if let Some(result) = finished {
                debug!(case_number = %case_number, job_id = %job_id, "Attached to finished job");
                self.spawn_notify(result, target);
            } else {
                debug!(case_number = %case_number, job_id = %job_id, "Attached to in-flight job");
            }

            self.record_request(&case_number, &job_id, Disposition::Attached)
                .await;
            return Ok((
                Acknowledgment {
                    job_id,
                    case_number,
                    disposition: Disposition::Attached,
                    artifact: None,
                },
                handle,
            ));
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = watch::channel(None);
        let replaced = state.jobs.insert(
            case_number.clone(),
            JobEntry {
                job: AcquisitionJob {
                    id: job_id.clone(),
                    case_number: case_number.clone(),
                    status: JobStatus::Queued,
                    waiters: 1,
                    created_at: Utc::now(),
                    started_at: None,
                    finished_at: None,
                    result: None,
                },
                tx,
                targets: vec![target],
                abort: None,
            },
        );
        if let Some(previous) = replaced {
            debug!(
                case_number = %case_number,
                previous_job_id = %previous.job.id,
                "Replacing failed job with a new run"
            );
        }

        if state.running < self.concurrency_limit() {
            Self::start(&self.inner, &mut state, &case_number);
        } else {
            state.queue.push_back(case_number.clone());
            info!(
                case_number = %case_number,
                job_id = %job_id,
                position = state.queue.len(),
                "Job queued"
            );
        }
        drop(state);

        self.record_request(&case_number, &job_id, Disposition::Accepted)
            .await;
        Ok((
            Acknowledgment {
                job_id: job_id.clone(),
                case_number: case_number.clone(),
                disposition: Disposition::Accepted,
                artifact: None,
            },
            JobHandle::new(&job_id, &case_number, rx),
        ))
    }

    /// Snapshot of running, queued and retained jobs.
    pub async fn status(&self) -> DispatcherStatus {
        let state = self.inner.state.lock().await;
        let mut jobs: Vec<AcquisitionJob> = state.jobs.values().map(|e| e.job.clone()).collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        DispatcherStatus {
            running: state.running,
            queued: state.queue.len(),
            concurrency_limit: self.concurrency_limit(),
            shutting_down: self.is_shutting_down(),
            jobs,
        }
    }

    /// Job currently tracked for a case.
    pub async fn job(&self, case_number: &str) -> Option<AcquisitionJob> {
        self.inner
            .state
            .lock()
            .await
            .jobs
            .get(case_number.trim())
            .map(|e| e.job.clone())
    }

    /// Stop accepting requests, fail queued jobs, and give running jobs
    /// `grace` to finish before aborting them.
    pub async fn shutdown(&self, grace: Duration) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.stopping.notify_waiters();

        let drained: Vec<(JobResult, Vec<Option<String>>)> = {
            let mut state = self.inner.state.lock().await;
            let queued: Vec<String> = state.queue.drain(..).collect();
            queued
                .into_iter()
                .filter_map(|case_number| {
                    let entry = state.jobs.get_mut(&case_number)?;
                    let outcome = AcquisitionFailure::new(
                        FailureCause::Shutdown,
                        AcquisitionStep::CheckingRecord,
                        "service shut down before the job started",
                    )
                    .into();
                    Some(Self::resolve(entry, outcome))
                })
                .collect()
        };

        info!(
            failed_queued = drained.len(),
            grace_secs = grace.as_secs(),
            "Dispatcher shutting down"
        );
        for (result, targets) in drained {
            self.inner.notify_all(&result, targets).await;
        }

        if self.inner.wait_idle(grace).await {
            return;
        }

        let aborts: Vec<AbortHandle> = {
            let state = self.inner.state.lock().await;
            state.jobs.values().filter_map(|e| e.abort.clone()).collect()
        };
        warn!(count = aborts.len(), "Aborting jobs still running after grace period");
        for handle in aborts {
            handle.abort();
        }

        if !self.inner.wait_idle(grace).await {
            error!("Jobs did not finish after abort");
        }
    }

    async fn short_circuit(
        &self,
        case_number: &str,
        file_name: &str,
        target: Option<String>,
    ) -> (Acknowledgment, JobHandle) {
        let job_id = uuid::Uuid::new_v4().to_string();
        let artifact = self.inner.orchestrator.stored_artifact(file_name);

        info!(case_number, file_name, "Case already acquired, answering from record");
        self.record_request(case_number, &job_id, Disposition::AlreadySatisfied)
            .await;
        emit_to(
            &self.inner.audit,
            AuditEvent::AcquisitionShortCircuited {
                case_number: case_number.to_string(),
                file_name: file_name.to_string(),
            },
        )
        .await;

        let result = JobResult::new(
            &job_id,
            case_number,
            AcquisitionOutcome::AlreadySatisfied {
                artifact: artifact.clone(),
            },
        );
        self.spawn_notify(result.clone(), target);

        (
            Acknowledgment {
                job_id,
                case_number: case_number.to_string(),
                disposition: Disposition::AlreadySatisfied,
                artifact: Some(artifact),
            },
            JobHandle::resolved(result),
        )
    }

    fn spawn_notify(&self, result: JobResult, target: Option<String>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.notify_all(&result, vec![target]).await;
        });
    }

    async fn record_request(&self, case_number: &str, job_id: &str, disposition: Disposition) {
        metrics::REQUESTS_TOTAL
            .with_label_values(&[disposition.as_str()])
            .inc();
        emit_to(
            &self.inner.audit,
            AuditEvent::AcquisitionRequested {
                case_number: case_number.to_string(),
                job_id: Some(job_id.to_string()),
                disposition: disposition.as_str().to_string(),
            },
        )
        .await;
    }

    /// Start a job. Caller holds the state lock.
    fn start(inner: &Arc<Inner>, state: &mut DispatchState, case_number: &str) {
        let Some(entry) = state.jobs.get_mut(case_number) else {
            return;
        };
        entry.job.status = JobStatus::Running;
        entry.job.started_at = Some(Utc::now());
        let job_id = entry.job.id.clone();

        let orchestrator = Arc::clone(&inner.orchestrator);
        let case = case_number.to_string();
        let run: JoinHandle<AcquisitionOutcome> =
            tokio::spawn(async move { orchestrator.run(&case).await });
        entry.abort = Some(run.abort_handle());
        state.running += 1;

        info!(case_number, job_id = %job_id, running = state.running, "Job started");

        let inner = Arc::clone(inner);
        let case = case_number.to_string();
        tokio::spawn(async move {
            let outcome = match run.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => AcquisitionFailure::new(
                    FailureCause::Shutdown,
                    AcquisitionStep::Cleanup,
                    "run aborted during shutdown",
                )
                .into(),
                Err(e) => {
                    error!(case_number = %case, job_id = %job_id, "Acquisition task panicked: {}", e);
                    AcquisitionFailure::new(
                        FailureCause::Internal,
                        AcquisitionStep::Cleanup,
                        "acquisition task panicked",
                    )
                    .into()
                }
            };
            Inner::finish(inner, case, job_id, outcome).await;
        });
    }

    /// Store the result on the entry and publish it to handles. Returns the
    /// targets still owed a notification.
    fn resolve(entry: &mut JobEntry, outcome: AcquisitionOutcome) -> (JobResult, Vec<Option<String>>) {
        let result = JobResult::new(&entry.job.id, &entry.job.case_number, outcome);
        entry.job.status = result.status();
        entry.job.finished_at = Some(result.finished_at);
        entry.job.result = Some(result.clone());
        entry.abort = None;
        entry.tx.send_replace(Some(result.clone()));
        (result, std::mem::take(&mut entry.targets))
    }
}

impl Inner {
    async fn finish(inner: Arc<Inner>, case_number: String, job_id: String, outcome: AcquisitionOutcome) {
        let resolved = {
            let mut state = inner.state.lock().await;
            state.running = state.running.saturating_sub(1);

            let resolved = match state.jobs.get_mut(&case_number) {
                Some(entry) if entry.job.id == job_id => Some(JobDispatcher::resolve(entry, outcome)),
                _ => {
                    warn!(case_number = %case_number, job_id = %job_id, "Finished job no longer tracked");
                    None
                }
            };

            if !inner.shutting_down.load(Ordering::SeqCst) {
                let limit = inner.config.concurrency_limit.max(1);
                while state.running < limit {
                    let Some(next) = state.queue.pop_front() else {
                        break;
                    };
                    JobDispatcher::start(&inner, &mut state, &next);
                }
            }

            if state.running == 0 {
                inner.idle.notify_waiters();
            }
            resolved
        };

        let Some((result, targets)) = resolved else {
            return;
        };

        info!(
            case_number = %case_number,
            job_id = %job_id,
            outcome = result.outcome.label(),
            "Job finished"
        );
        inner.notify_all(&result, targets).await;

        let retention = Duration::from_secs(inner.config.result_retention_secs);
        if !retention.is_zero() && !inner.shutting_down.load(Ordering::SeqCst) {
            tokio::select! {
                _ = tokio::time::sleep(retention) => {}
                _ = inner.stopping.notified() => {}
            }
        }
        let mut state = inner.state.lock().await;
        if state
            .jobs
            .get(&case_number)
            .is_some_and(|e| e.job.id == job_id)
        {
            state.jobs.remove(&case_number);
            debug!(case_number = %case_number, job_id = %job_id, "Job released");
        }
    }

    /// Notify every target concurrently. Failures are contained in
    /// `deliver_with_retry`.
    async fn notify_all(&self, result: &JobResult, targets: Vec<Option<String>>) {
        let payload = NotificationPayload::from_outcome(&result.case_number, &result.outcome);
        let policy = DeliveryPolicy::from(&self.notification);

        let deliveries = targets.into_iter().map(|target| {
            let payload = &payload;
            async move {
                match target {
                    Some(target) => {
                        deliver_with_retry(
                            self.notifier.as_ref(),
                            &target,
                            payload,
                            policy,
                            &self.audit,
                        )
                        .await;
                    }
                    None => debug!(
                        case_number = %payload.case_number,
                        "No notification target, skipping delivery"
                    ),
                }
            }
        });
        join_all(deliveries).await;
    }

    /// Wait until no job is running. Returns false on timeout.
    async fn wait_idle(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.idle.notified();
                if self.state.lock().await.running == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{CaseStore, SqliteCaseStore};
    use crate::storage::ArtifactStore;
    use crate::testing::{fixtures, MockNotifier, MockSessionFactory};
    use tempfile::TempDir;

    fn dispatcher(dir: &TempDir) -> (JobDispatcher, MockSessionFactory, MockNotifier, Arc<SqliteCaseStore>) {
        let config = fixtures::test_config(dir.path());
        let sessions = MockSessionFactory::new();
        let notifier = MockNotifier::new();
        let store = Arc::new(SqliteCaseStore::in_memory().unwrap());
        let artifacts = Arc::new(ArtifactStore::new(&config.storage));
        artifacts.ensure_layout().unwrap();

        let orchestrator = Arc::new(Orchestrator::new(
            config.acquisition.clone(),
            config.portal.clone(),
            Arc::new(sessions.clone()),
            store.clone(),
            artifacts,
            None,
        ));
        let dispatcher = JobDispatcher::new(
            orchestrator,
            Arc::new(notifier.clone()),
            config.dispatcher.clone(),
            config.notification.clone(),
            None,
        );
        (dispatcher, sessions, notifier, store)
    }

    #[tokio::test]
    async fn test_rejects_empty_case_number() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, _, _, _) = dispatcher(&dir);

        let result = dispatcher.acquire(AcquisitionRequest::new("  ")).await;
        assert!(matches!(result, Err(DispatchError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_accepts_and_runs_job() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, sessions, notifier, store) = dispatcher(&dir);

        let (ack, handle) = dispatcher
            .acquire(AcquisitionRequest::new("0001"))
            .await
            .unwrap();
        assert_eq!(ack.disposition, Disposition::Accepted);
        assert_eq!(handle.job_id(), ack.job_id);

        let result = handle.wait().await;
        assert!(result.outcome.is_success());
        assert!(store.exists("0001").unwrap());
        assert_eq!(sessions.opened(), 1);

        assert!(notifier.wait_for_deliveries(1, Duration::from_secs(2)).await);
        let delivered = notifier.delivered().await;
        assert_eq!(delivered[0].target, fixtures::NOTIFY_TARGET);
        assert!(delivered[0].payload.is_success());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_requests() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, _, _, _) = dispatcher(&dir);

        dispatcher.shutdown(Duration::from_millis(10)).await;
        assert!(dispatcher.is_shutting_down());

        let result = dispatcher.acquire(AcquisitionRequest::new("0001")).await;
        assert!(matches!(result, Err(DispatchError::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_status_reports_limit() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, _, _, _) = dispatcher(&dir);

        let status = dispatcher.status().await;
        assert_eq!(status.concurrency_limit, 2);
        assert_eq!(status.running, 0);
        assert_eq!(status.queued, 0);
        assert!(status.jobs.is_empty());
    }
}
