//! Testing utilities and mock implementations for integration tests.
//!
//! Mocks stand in for the portal session and the notification target so the
//! orchestrator and dispatcher can be exercised without a browser or network.
//!
//! # Example
//!
//! ```rust,ignore
//! use dossier_core::testing::{fixtures, Capability, MockNotifier, MockSessionFactory};
//!
//! let sessions = MockSessionFactory::new();
//! let notifier = MockNotifier::new();
//! let config = fixtures::test_config(temp_dir.path());
//!
//! // Portal refuses the login
//! sessions
//!     .fail(Capability::Authenticate, None, SessionError::Rejected("bad password".into()), 1)
//!     .await;
//! ```

mod mock_notifier;
mod mock_session;

pub use mock_notifier::{MockNotifier, RecordedNotification};
pub use mock_session::{Capability, MockSession, MockSessionFactory, RecordedCall, ScriptedFailure};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use crate::case::NewCaseRecord;
    use crate::config::{
        AcquisitionConfig, Config, DispatcherConfig, NotificationConfig, StorageConfig,
    };

    /// Default notification target in tests.
    pub const NOTIFY_TARGET: &str = "http://notify.test/hook";

    /// Config with fast timings and extension-less artifact names, so case
    /// "0001" is stored as file "0001".
    pub fn test_config(data_dir: &Path) -> Config {
        Config {
            storage: StorageConfig {
                data_dir: data_dir.to_path_buf(),
                public_base_url: "http://localhost:8080".to_string(),
                artifact_extension: String::new(),
            },
            acquisition: fast_acquisition(),
            dispatcher: DispatcherConfig {
                concurrency_limit: 2,
                result_retention_secs: 0,
            },
            notification: NotificationConfig {
                target: Some(NOTIFY_TARGET.to_string()),
                timeout_secs: 1,
                max_attempts: 2,
                retry_backoff_ms: 1,
            },
            ..Default::default()
        }
    }

    /// Acquisition timings that keep retries in the millisecond range.
    pub fn fast_acquisition() -> AcquisitionConfig {
        AcquisitionConfig {
            step_timeout_secs: 2,
            max_retries: 3,
            retry_backoff_ms: 1,
            backoff_multiplier: 1.0,
            max_backoff_ms: 5,
            overall_deadline_secs: 10,
            download_timeout_secs: 2,
        }
    }

    /// A completed record for `case_number` stored as `file_name`.
    pub fn completed_record(case_number: &str, file_name: &str) -> NewCaseRecord {
        NewCaseRecord::completed(case_number, file_name)
    }
}
