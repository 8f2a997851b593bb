//! Common test utilities for API testing with mocks.
//!
//! The fixture builds the real router, dispatcher, orchestrator and SQLite
//! stores in-process; only the portal session and the webhook are mocked.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use dossier_core::{
    create_audit_system, AuditStore, CaseStore, Config, JobDispatcher, Orchestrator,
    SqliteAuditStore, SqliteCaseStore,
    testing::{MockNotifier, MockSessionFactory},
    ArtifactStore,
};
use dossier_server::state::AppState;

/// Re-export fixtures for test convenience
pub use dossier_core::testing::fixtures;

/// A well-formed case number.
pub const CASE: &str = "0001234-56.2023.8.13.0024";

/// Test fixture with a mocked portal and webhook.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_acquire() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture
///         .post("/api/v1/cases", json!({ "case_number": CASE }))
///         .await;
///
///     assert_eq!(response.status, StatusCode::ACCEPTED);
/// }
/// ```
pub struct TestFixture {
    pub router: Router,
    /// Scripted portal sessions
    pub sessions: MockSessionFactory,
    /// Recorded webhook deliveries
    pub notifier: MockNotifier,
    pub case_store: Arc<SqliteCaseStore>,
    pub artifacts: Arc<ArtifactStore>,
    pub config: Config,
    _temp_dir: TempDir,
}

/// A response with its body decoded as JSON (`Null` when not JSON).
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub bytes: Bytes,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = fixtures::test_config(&temp_dir.path().join("data"));
        config.dispatcher.result_retention_secs = 5;
        config.portal.password = "secret".to_string();
        tweak(&mut config);

        let db_path = temp_dir.path().join("test.db");
        let audit_store: Arc<dyn AuditStore> =
            Arc::new(SqliteAuditStore::new(&db_path).expect("Failed to create audit store"));
        let case_store =
            Arc::new(SqliteCaseStore::new(&db_path).expect("Failed to create case store"));

        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let artifacts = Arc::new(ArtifactStore::new(&config.storage));
        artifacts.ensure_layout().expect("Failed to create layout");

        let sessions = MockSessionFactory::new();
        let notifier = MockNotifier::new();

        let orchestrator = Arc::new(Orchestrator::new(
            config.acquisition.clone(),
            config.portal.clone(),
            Arc::new(sessions.clone()),
            Arc::clone(&case_store) as Arc<dyn CaseStore>,
            Arc::clone(&artifacts),
            Some(audit_handle.clone()),
        ));
        let dispatcher = JobDispatcher::new(
            Arc::clone(&orchestrator),
            Arc::new(notifier.clone()),
            config.dispatcher.clone(),
            config.notification.clone(),
            Some(audit_handle),
        );

        let state = Arc::new(AppState::new(
            config.clone(),
            dispatcher,
            orchestrator,
            Arc::clone(&case_store) as Arc<dyn CaseStore>,
            audit_store,
        ));

        Self {
            router: dossier_server::api::create_router(state),
            sessions,
            notifier,
            case_store,
            artifacts,
            config,
            _temp_dir: temp_dir,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request with a raw body (for malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Poll a GET endpoint until `done` accepts the response.
    pub async fn wait_for(
        &self,
        path: &str,
        timeout: Duration,
        done: impl Fn(&TestResponse) -> bool,
    ) -> Option<TestResponse> {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            let response = self.get(path).await;
            if done(&response) {
                return Some(response);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            body,
            bytes,
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
