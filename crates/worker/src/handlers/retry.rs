//! Notifications coming back from the retry queue.
//!
//! Snapshots go through the same validating factory as fresh events. A
//! snapshot that cannot be rebuilt is requeued; a failed dispatch is rejected
//! because the retry scheduler has already decided what happens next.

use std::sync::Arc;

use async_trait::async_trait;

use herald_common::snapshot::NotificationSnapshot;
use herald_engine::Dispatcher;

use crate::consumer::{Acknowledgement, MessageHandler};

pub struct RetryHandler {
    dispatcher: Arc<Dispatcher>,
}

impl RetryHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl MessageHandler for RetryHandler {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn handle(&self, payload: &str) -> Acknowledgement {
        let mut notification = match NotificationSnapshot::parse(payload) {
            Ok(notification) => notification,
            Err(e) => {
                tracing::error!(error = %e, "Retry snapshot could not be rebuilt, requeueing");
                return Acknowledgement::Requeue;
            }
        };

        if notification.is_failed() {
            tracing::warn!(
                notification_id = %notification.id(),
                "Snapshot on retry queue is already terminal, dropping"
            );
            return Acknowledgement::Reject;
        }

        tracing::info!(
            notification_id = %notification.id(),
            tries = notification.tries(),
            "Retrying notification"
        );

        match self.dispatcher.dispatch(&mut notification).await {
            Ok(()) => Acknowledgement::Ack,
            Err(e) => {
                tracing::warn!(
                    notification_id = %notification.id(),
                    tries = notification.tries(),
                    error = %e,
                    "Retry attempt failed"
                );
                Acknowledgement::Reject
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_engine::mock::{
        MockGateway, MockNotificationRepository, MockSender, sample_notification,
    };
    use herald_engine::{CreationPublisher, RetryScheduler};

    fn handler(
        sender: &Arc<MockSender>,
        gateway: &Arc<MockGateway>,
        repository: &Arc<MockNotificationRepository>,
    ) -> RetryHandler {
        RetryHandler::new(Arc::new(Dispatcher::new(
            sender.clone(),
            RetryScheduler::new(gateway.clone(), repository.clone()),
            CreationPublisher::new(gateway.clone(), repository.clone()),
        )))
    }

    fn payload(tries: u32) -> String {
        NotificationSnapshot::from(&sample_notification(tries))
            .to_json()
            .unwrap()
    }

    #[tokio::test]
    async fn test_successful_retry_is_acked() {
        let sender = Arc::new(MockSender::new());
        let gateway = Arc::new(MockGateway::new());
        let repository = Arc::new(MockNotificationRepository::new());

        let ack = handler(&sender, &gateway, &repository).handle(&payload(3)).await;

        assert_eq!(ack, Acknowledgement::Ack);
        assert_eq!(sender.sent().await[0].tries(), 3);
        assert_eq!(gateway.created().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_snapshot_is_requeued() {
        let sender = Arc::new(MockSender::new());
        let gateway = Arc::new(MockGateway::new());
        let repository = Arc::new(MockNotificationRepository::new());
        let handler = handler(&sender, &gateway, &repository);

        assert_eq!(handler.handle("{broken").await, Acknowledgement::Requeue);
        assert_eq!(
            handler.handle(r#"{"clientId":"c1"}"#).await,
            Acknowledgement::Requeue
        );
        assert!(sender.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_retry_is_rejected_with_bumped_tries() {
        let sender = Arc::new(MockSender::new());
        sender.fail_next(1).await;
        let gateway = Arc::new(MockGateway::new());
        let repository = Arc::new(MockNotificationRepository::new());

        let ack = handler(&sender, &gateway, &repository).handle(&payload(2)).await;

        assert_eq!(ack, Acknowledgement::Reject);
        assert_eq!(gateway.retried().await[0].tries(), 3);
    }

    #[tokio::test]
    async fn test_terminal_snapshot_is_rejected_unsent() {
        let sender = Arc::new(MockSender::new());
        let gateway = Arc::new(MockGateway::new());
        let repository = Arc::new(MockNotificationRepository::new());
        let mut notification = sample_notification(6);
        notification.mark_as_failed("max retries exceeded");
        let payload = NotificationSnapshot::from(&notification).to_json().unwrap();

        let ack = handler(&sender, &gateway, &repository).handle(&payload).await;

        assert_eq!(ack, Acknowledgement::Reject);
        assert!(sender.sent().await.is_empty());
    }
}
