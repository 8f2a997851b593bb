//! Bounded-retry delivery.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::audit::{emit_to, AuditEvent, AuditHandle};
use crate::config::NotificationConfig;
use crate::metrics;

use super::{NotificationPayload, Notifier};

/// How hard to try before dropping a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl From<&NotificationConfig> for DeliveryPolicy {
    fn from(config: &NotificationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Deliver a payload, retrying with a fixed backoff.
///
/// Returns whether the target accepted it. A final failure is logged and
/// audited, never propagated.
pub async fn deliver_with_retry(
    notifier: &dyn Notifier,
    target: &str,
    payload: &NotificationPayload,
    policy: DeliveryPolicy,
    audit: &Option<AuditHandle>,
) -> bool {
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match notifier.notify(target, payload).await {
            Ok(()) => {
                info!(
                    case_number = %payload.case_number,
                    target,
                    attempt,
                    "Notification delivered"
                );
                metrics::NOTIFICATIONS_TOTAL
                    .with_label_values(&["delivered"])
                    .inc();
                emit_to(
                    audit,
                    AuditEvent::NotificationDelivered {
                        case_number: payload.case_number.clone(),
                        target: target.to_string(),
                        attempts: attempt,
                    },
                )
                .await;
                return true;
            }
            Err(e) => {
                last_error = e.to_string();
                if attempt < max_attempts {
                    warn!(
                        case_number = %payload.case_number,
                        target,
                        attempt,
                        max_attempts,
                        "Notification failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(policy.backoff).await;
                } else {
                    debug!(attempt, "Notification attempts exhausted");
                }
            }
        }
    }

    error!(
        case_number = %payload.case_number,
        target,
        attempts = max_attempts,
        "Dropping notification: {}",
        last_error
    );
    metrics::NOTIFICATIONS_TOTAL
        .with_label_values(&["failed"])
        .inc();
    emit_to(
        audit,
        AuditEvent::NotificationFailed {
            case_number: payload.case_number.clone(),
            target: target.to_string(),
            attempts: max_attempts,
            error: last_error,
        },
    )
    .await;
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationStatus;
    use crate::testing::MockNotifier;

    fn payload() -> NotificationPayload {
        NotificationPayload {
            case_number: "0001".into(),
            status: NotificationStatus::Success,
            artifact_url: Some("http://localhost/static/0001".into()),
            artifact_path: None,
            error: None,
            message: None,
        }
    }

    fn policy(max_attempts: u32) -> DeliveryPolicy {
        DeliveryPolicy {
            max_attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retries_until_delivered() {
        let notifier = MockNotifier::new();
        notifier.fail_next(2).await;

        let delivered =
            deliver_with_retry(&notifier, "http://hook", &payload(), policy(3), &None).await;

        assert!(delivered);
        assert_eq!(notifier.attempts().await, 3);
        assert_eq!(notifier.delivered().await.len(), 1);
    }

    #[tokio::test]
    async fn test_drops_after_max_attempts() {
        let notifier = MockNotifier::new();
        notifier.fail_next(5).await;

        let delivered =
            deliver_with_retry(&notifier, "http://hook", &payload(), policy(2), &None).await;

        assert!(!delivered);
        assert_eq!(notifier.attempts().await, 2);
        assert!(notifier.delivered().await.is_empty());
    }

    #[test]
    fn test_policy_from_config() {
        let config = NotificationConfig {
            max_attempts: 0,
            retry_backoff_ms: 250,
            ..Default::default()
        };
        let policy = DeliveryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.backoff, Duration::from_millis(250));
    }
}
