//! Creation publisher: announces a delivered notification.
//!
//! The announcement is best effort. When it cannot be published the snapshot
//! is written to the store directly, once, with no re-publish loop.

use std::sync::Arc;

use herald_common::error::PersistenceError;
use herald_common::notification::Notification;

use crate::ports::{NotificationGateway, NotificationRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationOutcome {
    /// Announcement accepted by the transport.
    Announced,
    /// Announcement failed; snapshot persisted directly instead.
    Persisted,
}

pub struct CreationPublisher {
    gateway: Arc<dyn NotificationGateway>,
    repository: Arc<dyn NotificationRepository>,
}

impl CreationPublisher {
    pub fn new(
        gateway: Arc<dyn NotificationGateway>,
        repository: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self {
            gateway,
            repository,
        }
    }

    pub async fn execute(
        &self,
        notification: &Notification,
    ) -> Result<CreationOutcome, PersistenceError> {
        let Err(e) = self.gateway.publish_created(notification).await else {
            tracing::debug!(notification_id = %notification.id(), "Creation announced");
            return Ok(CreationOutcome::Announced);
        };

        tracing::error!(
            notification_id = %notification.id(),
            error = %e,
            "Failed to publish creation, persisting directly"
        );
        self.repository.save(notification).await?;
        Ok(CreationOutcome::Persisted)
    }
}
