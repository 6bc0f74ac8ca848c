//! Retry scheduler: decides between another attempt and terminal failure.
//!
//! Runs once per failed delivery:
//! 1. bump `tries`
//! 2. over the ceiling → mark failed, persist, stop (a normal outcome)
//! 3. otherwise re-enqueue on the retry transport
//! 4. re-enqueue failed → mark failed, persist, surface the transport error
//!
//! The broker's retry delay is the backoff; the counter is the stop condition.

use std::sync::Arc;

use thiserror::Error;

use herald_common::error::{PersistenceError, TransportError};
use herald_common::notification::Notification;

use crate::ports::{NotificationGateway, NotificationRepository};

pub const MAX_RETRIES_EXCEEDED: &str = "max retries exceeded";
pub const RETRY_SCHEDULING_FAILED: &str = "failed to schedule retry";

/// What the scheduler decided for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Back on the retry transport; nothing persisted.
    Scheduled,
    /// Over the ceiling; terminal snapshot persisted.
    Exhausted,
}

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("Retry could not be scheduled: {0}")]
    Transport(#[from] TransportError),

    #[error("Terminal snapshot could not be persisted: {0}")]
    Persistence(#[from] PersistenceError),
}

pub struct RetryScheduler {
    gateway: Arc<dyn NotificationGateway>,
    repository: Arc<dyn NotificationRepository>,
}

impl RetryScheduler {
    pub fn new(
        gateway: Arc<dyn NotificationGateway>,
        repository: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self {
            gateway,
            repository,
        }
    }

    /// Handle one failed delivery of `notification`.
    pub async fn handle_failure(
        &self,
        notification: &mut Notification,
    ) -> Result<RetryOutcome, RetryError> {
        notification.increment_tries();

        if notification.exceeded_max_tries() {
            tracing::error!(
                notification_id = %notification.id(),
                tries = notification.tries(),
                "Max retries exceeded, recording terminal failure"
            );
            notification.mark_as_failed(MAX_RETRIES_EXCEEDED);
            self.repository.save(notification).await?;
            return Ok(RetryOutcome::Exhausted);
        }

        match self.gateway.publish_to_retry(notification).await {
            Ok(()) => {
                tracing::info!(
                    notification_id = %notification.id(),
                    tries = notification.tries(),
                    "Retry scheduled"
                );
                Ok(RetryOutcome::Scheduled)
            }
            Err(e) => {
                tracing::error!(
                    notification_id = %notification.id(),
                    tries = notification.tries(),
                    error = %e,
                    "Failed to schedule retry, recording terminal failure"
                );
                notification.mark_as_failed(RETRY_SCHEDULING_FAILED);
                if let Err(persist_err) = self.repository.save(notification).await {
                    tracing::error!(
                        notification_id = %notification.id(),
                        error = %persist_err,
                        "Terminal snapshot could not be persisted after retry scheduling failure"
                    );
                }
                Err(RetryError::Transport(e))
            }
        }
    }
}
