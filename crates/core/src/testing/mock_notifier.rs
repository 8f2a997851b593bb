//! Mock notifier for testing.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::notify::{NotificationPayload, Notifier, NotifyError};

/// A delivered notification.
#[derive(Debug, Clone)]
pub struct RecordedNotification {
    pub target: String,
    pub payload: NotificationPayload,
}

/// Records deliveries and fails on demand.
#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    delivered: Arc<RwLock<Vec<RecordedNotification>>>,
    attempts: Arc<RwLock<usize>>,
    failures_left: Arc<RwLock<u32>>,
    latency: Arc<RwLock<Option<Duration>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` deliveries.
    pub async fn fail_next(&self, times: u32) {
        *self.failures_left.write().await = times;
    }

    pub async fn set_latency(&self, delay: Duration) {
        *self.latency.write().await = Some(delay);
    }

    /// Successfully delivered notifications.
    pub async fn delivered(&self) -> Vec<RecordedNotification> {
        self.delivered.read().await.clone()
    }

    /// Delivery attempts, failed ones included.
    pub async fn attempts(&self) -> usize {
        *self.attempts.read().await
    }

    /// Wait until at least `count` notifications were delivered.
    pub async fn wait_for_deliveries(&self, count: usize, timeout: Duration) -> bool {
        let poll = async {
            while self.delivered.read().await.len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn notify(&self, target: &str, payload: &NotificationPayload) -> Result<(), NotifyError> {
        *self.attempts.write().await += 1;

        if let Some(delay) = *self.latency.read().await {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.failures_left.write().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(NotifyError::Rejected {
                    status: 503,
                    message: "mock failure".to_string(),
                });
            }
        }

        self.delivered.write().await.push(RecordedNotification {
            target: target.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}
