//! Dispatcher: the one path every notification takes, fresh or retried.
//!
//! send ok   → creation publisher
//! send fail → retry scheduler, then hand the original send error back

use std::sync::Arc;

use herald_common::error::DeliveryError;
use herald_common::notification::Notification;

use crate::ports::NotificationSender;
use crate::publisher::CreationPublisher;
use crate::retry::RetryScheduler;

pub struct Dispatcher {
    sender: Arc<dyn NotificationSender>,
    retry: RetryScheduler,
    publisher: CreationPublisher,
}

impl Dispatcher {
    pub fn new(
        sender: Arc<dyn NotificationSender>,
        retry: RetryScheduler,
        publisher: CreationPublisher,
    ) -> Self {
        Self {
            sender,
            retry,
            publisher,
        }
    }

    /// Attempt delivery of one notification.
    ///
    /// A failed send is returned to the caller after the retry scheduler has
    /// already run, so the caller must not schedule another retry. Errors from
    /// the creation publisher are logged only: the message went out.
    pub async fn dispatch(&self, notification: &mut Notification) -> Result<(), DeliveryError> {
        if let Err(send_err) = self.sender.send(notification).await {
            tracing::warn!(
                notification_id = %notification.id(),
                tries = notification.tries(),
                error = %send_err,
                "Delivery failed"
            );

            if let Err(retry_err) = self.retry.handle_failure(notification).await {
                tracing::error!(
                    notification_id = %notification.id(),
                    error = %retry_err,
                    "Retry handling failed"
                );
            }
            return Err(send_err);
        }

        tracing::info!(
            notification_id = %notification.id(),
            external_id = notification.external_id().unwrap_or_default(),
            "Notification delivered"
        );

        if let Err(e) = self.publisher.execute(notification).await {
            tracing::error!(
                notification_id = %notification.id(),
                error = %e,
                "Delivered notification could not be recorded"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockGateway, MockNotificationRepository, MockSender, sample_notification};

    struct Harness {
        sender: Arc<MockSender>,
        gateway: Arc<MockGateway>,
        repository: Arc<MockNotificationRepository>,
        dispatcher: Dispatcher,
    }

    fn harness() -> Harness {
        let sender = Arc::new(MockSender::new());
        let gateway = Arc::new(MockGateway::new());
        let repository = Arc::new(MockNotificationRepository::new());
        let dispatcher = Dispatcher::new(
            sender.clone(),
            RetryScheduler::new(gateway.clone(), repository.clone()),
            CreationPublisher::new(gateway.clone(), repository.clone()),
        );
        Harness {
            sender,
            gateway,
            repository,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn test_success_announces_and_never_retries() {
        let h = harness();
        let mut notification = sample_notification(0);

        h.dispatcher.dispatch(&mut notification).await.unwrap();

        assert_eq!(h.sender.sent().await.len(), 1);
        assert_eq!(h.gateway.created().await, vec![notification.clone()]);
        assert!(h.gateway.retried().await.is_empty());
        assert!(h.repository.saved().await.is_empty());
        assert_eq!(notification.tries(), 0);
    }

    #[tokio::test]
    async fn test_failure_schedules_retry_and_returns_send_error() {
        let h = harness();
        h.sender.fail_next(1).await;
        let mut notification = sample_notification(0);

        let err = h.dispatcher.dispatch(&mut notification).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Provider { status: 503, .. }));
        assert!(h.gateway.created().await.is_empty());

        // The scheduler mutated the caller's instance, not a copy.
        assert_eq!(notification.tries(), 1);
        let retried = h.gateway.retried().await;
        assert_eq!(retried, vec![notification]);
    }

    #[tokio::test]
    async fn test_failure_with_retry_queue_down_still_returns_send_error() {
        let h = harness();
        h.sender.fail_always(true).await;
        h.gateway.fail_retries(true).await;
        let mut notification = sample_notification(0);

        let err = h.dispatcher.dispatch(&mut notification).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Network(_)));
        assert!(notification.is_failed());
        assert_eq!(h.repository.saved().await.len(), 1);
    }

    #[tokio::test]
    async fn test_success_with_announcement_down_persists_and_succeeds() {
        let h = harness();
        h.gateway.fail_created(true).await;
        let mut notification = sample_notification(3);

        h.dispatcher.dispatch(&mut notification).await.unwrap();

        assert_eq!(h.repository.saved().await, vec![notification]);
        assert!(h.gateway.retried().await.is_empty());
    }

    #[tokio::test]
    async fn test_success_with_everything_down_is_still_success() {
        let h = harness();
        h.gateway.fail_created(true).await;
        h.repository.fail_saves(true).await;
        let mut notification = sample_notification(0);

        assert!(h.dispatcher.dispatch(&mut notification).await.is_ok());
    }
}
