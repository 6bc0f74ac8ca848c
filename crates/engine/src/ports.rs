//! Collaborators the dispatch pipeline talks to.
//!
//! Production implementations live in `herald-notifier` (SMS provider),
//! `herald-queue` (broker-backed gateway) and `herald-worker` (Postgres
//! repositories). In-memory doubles live in [`crate::mock`].

use async_trait::async_trait;

use herald_common::error::{DeliveryError, PersistenceError, TransportError};
use herald_common::notification::{Notification, Recipient};

/// Delivery channel.
///
/// A failure result does not guarantee the message was not delivered, and a
/// success result is not idempotent: calling it twice may send twice.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Outbound announcements onto the message transport.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Re-enqueue a notification for another delivery attempt once the retry
    /// delay has elapsed.
    async fn publish_to_retry(&self, notification: &Notification) -> Result<(), TransportError>;

    /// Announce that a notification was delivered.
    async fn publish_created(&self, notification: &Notification) -> Result<(), TransportError>;
}

/// Terminal sink for notification snapshots. Insert only.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn save(&self, notification: &Notification) -> Result<(), PersistenceError>;
}

/// Recipient lookup by client identifier.
#[async_trait]
pub trait RecipientRepository: Send + Sync {
    async fn find_by_client_id(&self, client_id: &str)
    -> Result<Option<Recipient>, PersistenceError>;
}
