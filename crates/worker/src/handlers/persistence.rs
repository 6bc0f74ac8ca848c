//! Terminal snapshots from the creation queue, written to the store.

use std::sync::Arc;

use async_trait::async_trait;

use herald_common::snapshot::NotificationSnapshot;
use herald_engine::NotificationRepository;

use crate::consumer::{Acknowledgement, MessageHandler};

pub struct PersistenceHandler {
    repository: Arc<dyn NotificationRepository>,
}

impl PersistenceHandler {
    pub fn new(repository: Arc<dyn NotificationRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl MessageHandler for PersistenceHandler {
    fn name(&self) -> &'static str {
        "persistence"
    }

    async fn handle(&self, payload: &str) -> Acknowledgement {
        let notification = match NotificationSnapshot::parse(payload) {
            Ok(notification) => notification,
            Err(e) => {
                tracing::error!(error = %e, "Malformed snapshot on persistence queue");
                return Acknowledgement::Reject;
            }
        };

        match self.repository.save(&notification).await {
            Ok(()) => {
                tracing::info!(
                    notification_id = %notification.id(),
                    failed = notification.is_failed(),
                    "Notification persisted"
                );
                Acknowledgement::Ack
            }
            Err(e) => {
                tracing::error!(
                    notification_id = %notification.id(),
                    error = %e,
                    "Failed to persist notification"
                );
                Acknowledgement::Reject
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_engine::mock::{MockNotificationRepository, sample_notification};

    #[tokio::test]
    async fn test_snapshot_is_saved_and_acked() {
        let repository = Arc::new(MockNotificationRepository::new());
        let handler = PersistenceHandler::new(repository.clone());
        let notification = sample_notification(1);
        let payload = NotificationSnapshot::from(&notification).to_json().unwrap();

        assert_eq!(handler.handle(&payload).await, Acknowledgement::Ack);
        assert_eq!(repository.saved().await, vec![notification]);
    }

    #[tokio::test]
    async fn test_malformed_or_unwritable_is_rejected() {
        let repository = Arc::new(MockNotificationRepository::new());
        let handler = PersistenceHandler::new(repository.clone());
        assert_eq!(handler.handle("[]").await, Acknowledgement::Reject);

        repository.fail_saves(true).await;
        let payload = NotificationSnapshot::from(&sample_notification(0))
            .to_json()
            .unwrap();
        assert_eq!(handler.handle(&payload).await, Acknowledgement::Reject);
        assert!(repository.saved().await.is_empty());
    }
}
