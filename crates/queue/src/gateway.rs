use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use herald_common::error::TransportError;
use herald_common::notification::Notification;
use herald_common::snapshot::NotificationSnapshot;
use herald_engine::ports::NotificationGateway;

use crate::broker::MessageBroker;

/// Publishes notification snapshots onto the retry and creation queues.
pub struct BrokerGateway {
    broker: Arc<dyn MessageBroker>,
    retry_queue: String,
    creation_queue: String,
    retry_delay: Duration,
}

impl BrokerGateway {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        retry_queue: impl Into<String>,
        creation_queue: impl Into<String>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            broker,
            retry_queue: retry_queue.into(),
            creation_queue: creation_queue.into(),
            retry_delay,
        }
    }
}

#[async_trait]
impl NotificationGateway for BrokerGateway {
    async fn publish_to_retry(&self, notification: &Notification) -> Result<(), TransportError> {
        let payload = NotificationSnapshot::from(notification).to_json()?;
        self.broker
            .publish_delayed(&self.retry_queue, &payload, self.retry_delay)
            .await?;

        tracing::debug!(
            notification_id = %notification.id(),
            queue = %self.retry_queue,
            delay_ms = self.retry_delay.as_millis() as u64,
            "Published to retry queue"
        );
        Ok(())
    }

    async fn publish_created(&self, notification: &Notification) -> Result<(), TransportError> {
        let payload = NotificationSnapshot::from(notification).to_json()?;
        self.broker.publish(&self.creation_queue, &payload).await?;

        tracing::debug!(
            notification_id = %notification.id(),
            queue = %self.creation_queue,
            "Published creation announcement"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBroker;
    use herald_engine::mock::sample_notification;

    fn gateway(broker: &Arc<InMemoryBroker>) -> BrokerGateway {
        BrokerGateway::new(
            broker.clone(),
            "retry",
            "create",
            Duration::from_secs(600),
        )
    }

    #[tokio::test]
    async fn test_retry_publish_is_delayed_snapshot() {
        let broker = Arc::new(InMemoryBroker::new());
        let notification = sample_notification(2);

        gateway(&broker).publish_to_retry(&notification).await.unwrap();

        assert!(broker.ready("retry").await.is_empty());
        let delayed = broker.delayed("retry").await;
        assert_eq!(delayed.len(), 1);
        assert_eq!(NotificationSnapshot::parse(&delayed[0]).unwrap(), notification);
    }

    #[tokio::test]
    async fn test_created_publish_is_immediate() {
        let broker = Arc::new(InMemoryBroker::new());
        let notification = sample_notification(0);

        gateway(&broker).publish_created(&notification).await.unwrap();

        let ready = broker.ready("create").await;
        assert_eq!(ready.len(), 1);
        assert_eq!(NotificationSnapshot::parse(&ready[0]).unwrap(), notification);
    }

    #[tokio::test]
    async fn test_broker_failure_surfaces_transport_error() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.fail_publishes(true).await;

        let result = gateway(&broker).publish_to_retry(&sample_notification(0)).await;
        assert!(matches!(result, Err(TransportError::Unavailable(_))));
    }
}
