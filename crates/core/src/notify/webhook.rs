//! HTTP webhook notifier.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{NotificationPayload, Notifier, NotifyError};

/// Posts the payload as JSON to the target URL.
pub struct WebhookNotifier {
    client: Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, target: &str, payload: &NotificationPayload) -> Result<(), NotifyError> {
        if !(target.starts_with("http://") || target.starts_with("https://")) {
            return Err(NotifyError::InvalidTarget(target.to_string()));
        }

        debug!(target, case_number = %payload.case_number, "Posting notification");

        let response = self.client.post(target).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(())
    }
}
