//! The `Notification` aggregate and its embedded `Recipient`.
//!
//! Both are only reachable through validating constructors. Queue payloads
//! are rehydrated through the same constructors (see `snapshot`), so a
//! notification read back from the retry queue is held to the same
//! invariants as a freshly created one.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::types::{Channel, Status};

/// Retry scheduling decisions allowed before a notification is given up on.
///
/// The ceiling comparison is strictly greater-than, so a notification whose
/// counter reaches exactly `MAX_TRIES` still gets scheduled once more.
pub const MAX_TRIES: u32 = 5;

/// Who receives the message. Embedded by value so retries never re-query it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    client_id: String,
    phone_number: String,
    name: Option<String>,
}

impl Recipient {
    pub fn new(
        client_id: impl Into<String>,
        phone_number: impl Into<String>,
        name: Option<String>,
    ) -> Result<Self, ValidationError> {
        let client_id = client_id.into();
        let phone_number = phone_number.into();

        if client_id.trim().is_empty() {
            return Err(ValidationError::MissingClientId);
        }
        if phone_number.trim().is_empty() {
            return Err(ValidationError::MissingPhoneNumber);
        }

        Ok(Self {
            client_id,
            phone_number,
            name: name.filter(|n| !n.trim().is_empty()),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Terminal-failure marker. Present means `failed = true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Construction input for [`Notification::create`].
///
/// `status` and `channel` stay stringly typed here on purpose: membership is
/// checked by the factory, not by the caller.
#[derive(Debug, Clone)]
pub struct NotificationProps {
    pub id: Option<Uuid>,
    pub external_id: Option<String>,
    pub status: String,
    pub channel: String,
    pub recipient: Recipient,
    pub tries: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub failure: Option<Failure>,
}

impl NotificationProps {
    /// Props for a brand new `pending` SMS notification.
    pub fn new(recipient: Recipient) -> Self {
        Self {
            id: None,
            external_id: None,
            status: Status::Pending.as_str().to_string(),
            channel: Channel::Sms.as_str().to_string(),
            recipient,
            tries: 0,
            created_at: None,
            failure: None,
        }
    }
}

/// A single notification travelling through the dispatch pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    id: Uuid,
    external_id: Option<String>,
    status: Status,
    channel: Channel,
    recipient: Recipient,
    tries: u32,
    failure: Option<Failure>,
    created_at: DateTime<Utc>,
}

impl Notification {
    /// Validate `props` and build the aggregate.
    pub fn create(props: NotificationProps) -> Result<Self, ValidationError> {
        let status: Status = props.status.parse()?;
        let channel: Channel = props.channel.parse()?;

        Ok(Self {
            id: props.id.unwrap_or_else(Uuid::new_v4),
            external_id: props.external_id.filter(|e| !e.is_empty()),
            status,
            channel,
            recipient: props.recipient,
            tries: props.tries,
            failure: props.failure,
            created_at: props.created_at.unwrap_or_else(Utc::now),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn recipient(&self) -> &Recipient {
        &self.recipient
    }

    pub fn tries(&self) -> u32 {
        self.tries
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    pub fn failure_message(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.message.as_str())
    }

    pub fn failed_at(&self) -> Option<DateTime<Utc>> {
        self.failure.as_ref().map(|f| f.at)
    }

    /// Count one more retry scheduling decision.
    pub fn increment_tries(&mut self) {
        if self.is_failed() {
            tracing::warn!(
                notification_id = %self.id,
                tries = self.tries,
                "Refusing to bump tries on a failed notification"
            );
            return;
        }
        self.tries = self.tries.saturating_add(1);
    }

    pub fn exceeded_max_tries(&self) -> bool {
        self.tries > MAX_TRIES
    }

    /// Set the terminal-failure marker. The status is left as it was.
    ///
    /// Returns `false` (and keeps the original marker) if the notification
    /// had already been marked.
    pub fn mark_as_failed(&mut self, reason: impl Into<String>) -> bool {
        if let Some(existing) = &self.failure {
            tracing::warn!(
                notification_id = %self.id,
                existing = %existing.message,
                "Notification already marked as failed"
            );
            return false;
        }

        self.failure = Some(Failure {
            message: reason.into(),
            at: Utc::now(),
        });
        true
    }
}
