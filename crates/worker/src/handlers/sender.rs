//! New notification events.
//!
//! Every failure rejects. A failed dispatch has already been handed to the
//! retry scheduler, so requeueing here would schedule the retry twice.

use std::sync::Arc;

use async_trait::async_trait;

use herald_common::error::IntakeError;
use herald_common::notification::Notification;
use herald_common::snapshot::IncomingEvent;
use herald_engine::{Dispatcher, RecipientRepository};

use crate::consumer::{Acknowledgement, MessageHandler};

pub struct SenderHandler {
    recipients: Arc<dyn RecipientRepository>,
    dispatcher: Arc<Dispatcher>,
}

impl SenderHandler {
    pub fn new(recipients: Arc<dyn RecipientRepository>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            recipients,
            dispatcher,
        }
    }

    async fn intake(&self, payload: &str) -> Result<Notification, IntakeError> {
        let event = IncomingEvent::parse(payload)?;
        let recipient = self
            .recipients
            .find_by_client_id(&event.client_id)
            .await?
            .ok_or_else(|| IntakeError::RecipientNotFound(event.client_id.clone()))?;

        let mut notification = Notification::create(event.into_props(recipient))?;
        tracing::info!(
            notification_id = %notification.id(),
            client_id = %notification.recipient().client_id(),
            external_id = notification.external_id().unwrap_or_default(),
            "Notification created"
        );

        self.dispatcher.dispatch(&mut notification).await?;
        Ok(notification)
    }
}

#[async_trait]
impl MessageHandler for SenderHandler {
    fn name(&self) -> &'static str {
        "sender"
    }

    async fn handle(&self, payload: &str) -> Acknowledgement {
        match self.intake(payload).await {
            Ok(_) => Acknowledgement::Ack,
            Err(IntakeError::Delivery(e)) => {
                tracing::warn!(error = %e, "Dispatch failed, retry already scheduled");
                Acknowledgement::Reject
            }
            Err(e) => {
                tracing::error!(error = %e, "Rejecting notification event");
                Acknowledgement::Reject
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_common::notification::Recipient;
    use herald_engine::mock::{
        MockGateway, MockNotificationRepository, MockRecipientRepository, MockSender,
    };
    use herald_engine::{CreationPublisher, RetryScheduler};

    struct Harness {
        sender: Arc<MockSender>,
        gateway: Arc<MockGateway>,
        recipients: Arc<MockRecipientRepository>,
        handler: SenderHandler,
    }

    async fn harness() -> Harness {
        let sender = Arc::new(MockSender::new());
        let gateway = Arc::new(MockGateway::new());
        let repository = Arc::new(MockNotificationRepository::new());
        let recipients = Arc::new(MockRecipientRepository::new());
        recipients
            .insert(Recipient::new("c1", "+5511999990000", Some("Ana".to_string())).unwrap())
            .await;

        let dispatcher = Arc::new(Dispatcher::new(
            sender.clone(),
            RetryScheduler::new(gateway.clone(), repository.clone()),
            CreationPublisher::new(gateway.clone(), repository.clone()),
        ));
        let handler = SenderHandler::new(recipients.clone(), dispatcher);
        Harness {
            sender,
            gateway,
            recipients,
            handler,
        }
    }

    #[tokio::test]
    async fn test_event_with_known_recipient_is_acked() {
        let h = harness().await;

        let ack = h
            .handler
            .handle(r#"{"clientId":"c1","externalId":"A-1","status":"accepted"}"#)
            .await;

        assert_eq!(ack, Acknowledgement::Ack);
        let created = h.gateway.created().await;
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].external_id(), Some("A-1"));
        assert_eq!(created[0].recipient().phone_number(), "+5511999990000");
    }

    #[tokio::test]
    async fn test_poison_messages_are_rejected_without_sending() {
        let h = harness().await;

        for payload in [
            "not json",
            r#"{"clientId":"nobody"}"#,
            r#"{"clientId":"c1","status":"lost"}"#,
        ] {
            assert_eq!(h.handler.handle(payload).await, Acknowledgement::Reject);
        }
        assert!(h.sender.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failure_is_rejected() {
        let h = harness().await;
        h.recipients.fail_lookups(true).await;

        assert_eq!(
            h.handler.handle(r#"{"clientId":"c1"}"#).await,
            Acknowledgement::Reject
        );
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_rejected_not_requeued() {
        let h = harness().await;
        h.sender.fail_next(1).await;

        let ack = h.handler.handle(r#"{"clientId":"c1"}"#).await;

        assert_eq!(ack, Acknowledgement::Reject);
        assert_eq!(h.gateway.retried().await.len(), 1);
    }
}
