//! Broker port and the message frame shared by every implementation.
//!
//! Each logical queue `q` is made of four parts:
//!
//! | part         | holds                                             |
//! |--------------|---------------------------------------------------|
//! | `q`          | messages ready to be fetched, FIFO                |
//! | `q:inflight` | fetched, not yet acknowledged                     |
//! | `q:delayed`  | published with a delay, keyed by due time          |
//! | `q:dead`     | rejected or expired messages                      |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use herald_common::error::TransportError;

pub fn inflight_key(queue: &str) -> String {
    format!("{queue}:inflight")
}

pub fn delayed_key(queue: &str) -> String {
    format!("{queue}:delayed")
}

pub fn dead_key(queue: &str) -> String {
    format!("{queue}:dead")
}

/// Envelope around a payload while it sits in a queue.
///
/// `enqueued_at` is the moment the message became visible: publish time for
/// immediate messages, due time for delayed ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    pub id: Uuid,
    pub payload: String,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub redeliveries: u32,
}

impl QueueMessage {
    pub fn new(payload: impl Into<String>, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload: payload.into(),
            enqueued_at,
            redeliveries: 0,
        }
    }

    pub fn encode(&self) -> Result<String, TransportError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Unwrap a stored entry. Entries pushed by external producers carry no
    /// frame and are taken as the payload itself, seen for the first time now.
    ///
    /// An unframed entry gets a fresh id and `enqueued_at = now` on every
    /// decode, so it never expires under a queue TTL while it sits in the
    /// ready list. It only gains a frame once it is redelivered.
    pub fn decode(raw: &str, now: DateTime<Utc>) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|_| Self::new(raw, now))
    }

    /// Copy of this message for another trip through the ready list.
    pub fn redelivered(&self, now: DateTime<Utc>) -> Self {
        Self {
            id: self.id,
            payload: self.payload.clone(),
            enqueued_at: now,
            redeliveries: self.redeliveries + 1,
        }
    }

    pub fn is_expired(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        let Some(ttl) = ttl else {
            return false;
        };
        let age = now.signed_duration_since(self.enqueued_at);
        age.to_std().map(|age| age > ttl).unwrap_or(false)
    }
}

/// Per-queue settings applied on fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    /// Messages older than this are dead-lettered instead of delivered.
    pub message_ttl: Option<Duration>,
}

impl QueueOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            message_ttl: Some(ttl),
        }
    }
}

/// A fetched message, owned by the consumer until acked or rejected.
#[derive(Debug, Clone)]
pub struct Delivery {
    queue: String,
    raw: String,
    message: QueueMessage,
}

impl Delivery {
    pub fn new(queue: impl Into<String>, raw: String, message: QueueMessage) -> Self {
        Self {
            queue: queue.into(),
            raw,
            message,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Entry exactly as stored in the inflight list.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn message(&self) -> &QueueMessage {
        &self.message
    }

    pub fn payload(&self) -> &str {
        &self.message.payload
    }

    pub fn redeliveries(&self) -> u32 {
        self.message.redeliveries
    }
}

/// Message transport.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Append a payload to the ready list of `queue`.
    async fn publish(&self, queue: &str, payload: &str) -> Result<(), TransportError>;

    /// Make a payload visible on `queue` only after `delay` has elapsed.
    async fn publish_delayed(
        &self,
        queue: &str,
        payload: &str,
        delay: Duration,
    ) -> Result<(), TransportError>;

    /// Move the next ready message to inflight. `None` when the queue is empty.
    async fn fetch(
        &self,
        queue: &str,
        options: &QueueOptions,
    ) -> Result<Option<Delivery>, TransportError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), TransportError>;

    /// Drop from inflight. With `requeue` the message goes back to the ready
    /// list with its redelivery count bumped, otherwise to the dead letters.
    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), TransportError>;

    /// Put every unacknowledged message of `queue` back at the head of the
    /// ready list, redelivery count bumped. Returns how many were moved.
    ///
    /// Only safe while no other consumer of `queue` is running.
    async fn recover_inflight(&self, queue: &str) -> Result<usize, TransportError>;
}
