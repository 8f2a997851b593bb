//! Mock session driver for testing.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::session::{
    Action, Condition, Credentials, DownloadRequest, ElementRef, PageState, Selector,
    SessionDriver, SessionError, SessionFactory,
};

/// Session capability, used to target scripted failures and latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Open,
    Authenticate,
    Navigate,
    WaitFor,
    Locate,
    Interact,
    TriggerDownload,
    CaptureDiagnostic,
    Close,
}

/// A failure returned by matching calls until `remaining` runs out.
#[derive(Debug, Clone)]
pub struct ScriptedFailure {
    pub capability: Capability,
    /// Only calls whose target contains this fragment match.
    pub target: Option<String>,
    pub error: SessionError,
    pub remaining: u32,
}

/// A delay applied to matching calls before they return.
#[derive(Debug, Clone)]
struct ScriptedLatency {
    capability: Capability,
    /// Only calls whose target contains this fragment are delayed.
    target: Option<String>,
    delay: Duration,
}

/// A recorded capability call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub capability: Capability,
    pub target: String,
}

#[derive(Debug)]
struct MockState {
    failures: Vec<ScriptedFailure>,
    latency: Vec<ScriptedLatency>,
    artifact: Vec<u8>,
    calls: Vec<RecordedCall>,
}

#[derive(Debug)]
struct Shared {
    state: RwLock<MockState>,
    created: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Factory handing out [`MockSession`]s that share one script.
///
/// # Example
///
/// ```rust,ignore
/// let sessions = MockSessionFactory::new();
///
/// // Result link never shows up
/// sessions
///     .fail(Capability::WaitFor, Some("0005"), SessionError::Timeout("slow".into()), 3)
///     .await;
///
/// // ... run the orchestrator ...
///
/// assert_eq!(sessions.opened(), sessions.closed());
/// ```
#[derive(Debug, Clone)]
pub struct MockSessionFactory {
    shared: Arc<Shared>,
}

impl Default for MockSessionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSessionFactory {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(MockState {
                    failures: Vec::new(),
                    latency: Vec::new(),
                    artifact: b"%PDF-1.4\n% mock case file\n".to_vec(),
                    calls: Vec::new(),
                }),
                created: AtomicUsize::new(0),
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            }),
        }
    }

    /// Fail the next `times` calls of `capability` whose target contains
    /// `target` (any target when `None`).
    pub async fn fail(
        &self,
        capability: Capability,
        target: Option<&str>,
        error: SessionError,
        times: u32,
    ) {
        self.shared.state.write().await.failures.push(ScriptedFailure {
            capability,
            target: target.map(str::to_string),
            error,
            remaining: times,
        });
    }

    /// Delay every call of `capability`.
    pub async fn set_latency(&self, capability: Capability, delay: Duration) {
        self.set_target_latency(capability, None, delay).await;
    }

    /// Delay calls of `capability` whose target contains `target`. Targeted
    /// delays win over a capability-wide one.
    pub async fn set_target_latency(
        &self,
        capability: Capability,
        target: Option<&str>,
        delay: Duration,
    ) {
        let mut state = self.shared.state.write().await;
        state
            .latency
            .retain(|l| !(l.capability == capability && l.target.as_deref() == target));
        let entry = ScriptedLatency {
            capability,
            target: target.map(str::to_string),
            delay,
        };
        if entry.target.is_some() {
            state.latency.insert(0, entry);
        } else {
            state.latency.push(entry);
        }
    }

    /// Bytes written by `trigger_download`.
    pub async fn set_artifact(&self, bytes: impl Into<Vec<u8>>) {
        self.shared.state.write().await.artifact = bytes.into();
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.shared.state.read().await.calls.clone()
    }

    /// Number of calls to `capability` across all sessions.
    pub async fn call_count(&self, capability: Capability) -> usize {
        self.shared
            .state
            .read()
            .await
            .calls
            .iter()
            .filter(|c| c.capability == capability)
            .count()
    }

    /// Drivers handed out by `create`.
    pub fn created(&self) -> usize {
        self.shared.created.load(Ordering::SeqCst)
    }

    /// Sessions successfully opened.
    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// Opened sessions that were closed again.
    pub fn closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl SessionFactory for MockSessionFactory {
    fn create(&self) -> Box<dyn SessionDriver> {
        self.shared.created.fetch_add(1, Ordering::SeqCst);
        Box::new(MockSession {
            shared: Arc::clone(&self.shared),
            open: false,
            url: None,
            next_element: 0,
        })
    }
}

/// One scripted session.
#[derive(Debug)]
pub struct MockSession {
    shared: Arc<Shared>,
    open: bool,
    url: Option<String>,
    next_element: usize,
}

impl MockSession {
    /// Record the call, apply latency, then return a scripted failure if one
    /// matches.
    async fn call(&self, capability: Capability, target: String) -> Result<(), SessionError> {
        let (delay, failure) = {
            let mut state = self.shared.state.write().await;
            state.calls.push(RecordedCall {
                capability,
                target: target.clone(),
            });

            let delay = state
                .latency
                .iter()
                .find(|l| {
                    l.capability == capability
                        && l.target.as_deref().map_or(true, |t| target.contains(t))
                })
                .map(|l| l.delay);

            let failure = state
                .failures
                .iter_mut()
                .find(|f| {
                    f.capability == capability
                        && f.remaining > 0
                        && f.target.as_deref().map_or(true, |t| target.contains(t))
                })
                .map(|f| {
                    f.remaining -= 1;
                    f.error.clone()
                });

            (delay, failure)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.open {
            Ok(())
        } else {
            Err(SessionError::Transport("session not open".to_string()))
        }
    }
}

#[async_trait]
impl SessionDriver for MockSession {
    fn name(&self) -> &str {
        "mock"
    }

    async fn open(&mut self) -> Result<(), SessionError> {
        self.call(Capability::Open, String::new()).await?;
        if !self.open {
            self.open = true;
            self.shared.opened.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.call(Capability::Authenticate, credentials.username.clone())
            .await
    }

    async fn navigate(&mut self, target: &str) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.call(Capability::Navigate, target.to_string()).await?;
        self.url = Some(target.to_string());
        Ok(())
    }

    async fn wait_for(
        &mut self,
        condition: &Condition,
        _timeout: Duration,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.call(Capability::WaitFor, condition.to_string()).await
    }

    async fn locate(&mut self, selector: &Selector) -> Result<ElementRef, SessionError> {
        self.ensure_open()?;
        self.call(Capability::Locate, selector.to_string()).await?;
        self.next_element += 1;
        Ok(ElementRef {
            id: format!("element-{}", self.next_element),
            selector: selector.clone(),
        })
    }

    async fn interact(&mut self, element: &ElementRef, action: &Action) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.call(
            Capability::Interact,
            format!("{} {}", action.name(), element.selector),
        )
        .await
    }

    async fn trigger_download(
        &mut self,
        request: &DownloadRequest,
    ) -> Result<PathBuf, SessionError> {
        self.ensure_open()?;
        self.call(Capability::TriggerDownload, request.control.to_string())
            .await?;

        let bytes = self.shared.state.read().await.artifact.clone();
        if let Some(parent) = request.destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SessionError::Transport(e.to_string()))?;
        }
        tokio::fs::write(&request.destination, bytes)
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        Ok(request.destination.clone())
    }

    async fn capture_diagnostic(&mut self) -> Result<PageState, SessionError> {
        self.ensure_open()?;
        self.call(Capability::CaptureDiagnostic, String::new()).await?;
        Ok(PageState {
            url: self.url.clone(),
            title: Some("Mock portal".to_string()),
            page_source: Some("<html><body>mock</body></html>".to_string()),
            screenshot: None,
        })
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.open {
            self.open = false;
            self.shared.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_failure_is_consumed() {
        let factory = MockSessionFactory::new();
        factory
            .fail(
                Capability::Navigate,
                Some("search"),
                SessionError::Timeout("slow".into()),
                1,
            )
            .await;

        let mut session = factory.create();
        session.open().await.unwrap();

        assert!(session.navigate("https://portal/login").await.is_ok());
        assert_eq!(
            session.navigate("https://portal/search").await,
            Err(SessionError::Timeout("slow".into()))
        );
        assert!(session.navigate("https://portal/search").await.is_ok());
        assert_eq!(factory.call_count(Capability::Navigate).await, 3);
    }

    #[tokio::test]
    async fn test_targeted_latency_only_delays_matching_calls() {
        let factory = MockSessionFactory::new();
        factory
            .set_target_latency(Capability::Navigate, Some("search"), Duration::from_millis(200))
            .await;

        let mut session = factory.create();
        session.open().await.unwrap();

        let started = std::time::Instant::now();
        session.navigate("https://portal/login").await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(150));

        session.navigate("https://portal/search").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_open_close_counters() {
        let factory = MockSessionFactory::new();
        let mut never_opened = factory.create();
        never_opened.close().await.unwrap();

        let mut session = factory.create();
        session.open().await.unwrap();
        session.close().await.unwrap();
        session.close().await.unwrap();

        assert_eq!(factory.created(), 2);
        assert_eq!(factory.opened(), 1);
        assert_eq!(factory.closed(), 1);
    }

    #[tokio::test]
    async fn test_download_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockSessionFactory::new();
        factory.set_artifact(b"content".to_vec()).await;

        let mut session = factory.create();
        session.open().await.unwrap();
        let path = session
            .trigger_download(&DownloadRequest {
                control: Selector::Css("button".into()),
                destination: dir.path().join("staging/0001.pdf"),
                timeout: Duration::from_secs(1),
            })
            .await
            .unwrap();

        assert_eq!(std::fs::read(path).unwrap(), b"content");
    }
}
