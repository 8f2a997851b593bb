//! Result notification.
//!
//! Delivers the terminal result of a job to the requester's callback target.
//! Delivery is isolated from the job: failures are retried a bounded number of
//! times, then logged and dropped.

mod delivery;
mod types;
mod webhook;

pub use delivery::{deliver_with_retry, DeliveryPolicy};
pub use types::{NotificationPayload, NotificationStatus};
pub use webhook::WebhookNotifier;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from a single delivery attempt.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Target answered with a non-success status.
    #[error("target rejected notification: {status} - {message}")]
    Rejected { status: u16, message: String },

    /// Target is not a usable URL.
    #[error("invalid notification target: {0}")]
    InvalidTarget(String),
}

/// Delivers a payload to a target.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, target: &str, payload: &NotificationPayload) -> Result<(), NotifyError>;
}
