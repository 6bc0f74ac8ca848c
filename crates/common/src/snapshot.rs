//! Queue payloads.
//!
//! Every queue carries the same camelCase JSON envelope for a notification:
//!
//! ```json
//! { "id", "externalId", "status", "channel", "tries",
//!   "recipient": { "clientId", "phoneNumber", "name" },
//!   "createdAt", "failed", "failureMessage", "failedAt" }
//! ```
//!
//! except the incoming queue, which only carries the triggering event and
//! leaves the recipient to be looked up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{IntakeError, ValidationError};
use crate::notification::{Failure, Notification, NotificationProps, Recipient};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientPayload {
    pub client_id: String,
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Full serialized state of a notification at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSnapshot {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub status: String,
    pub channel: String,
    #[serde(default)]
    pub tries: u32,
    pub recipient: RecipientPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl NotificationSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a raw queue payload and rebuild the aggregate through its factory.
    pub fn parse(payload: &str) -> Result<Notification, IntakeError> {
        let snapshot: NotificationSnapshot = serde_json::from_str(payload)?;
        Ok(Notification::try_from(snapshot)?)
    }
}

impl From<&Notification> for NotificationSnapshot {
    fn from(notification: &Notification) -> Self {
        let recipient = notification.recipient();
        Self {
            id: notification.id(),
            external_id: notification.external_id().map(str::to_string),
            status: notification.status().as_str().to_string(),
            channel: notification.channel().as_str().to_string(),
            tries: notification.tries(),
            recipient: RecipientPayload {
                client_id: recipient.client_id().to_string(),
                phone_number: recipient.phone_number().to_string(),
                name: recipient.name().map(str::to_string),
            },
            created_at: Some(notification.created_at()),
            failed: notification.is_failed(),
            failure_message: notification.failure_message().map(str::to_string),
            failed_at: notification.failed_at(),
        }
    }
}

impl TryFrom<NotificationSnapshot> for Notification {
    type Error = ValidationError;

    fn try_from(snapshot: NotificationSnapshot) -> Result<Self, Self::Error> {
        let recipient = Recipient::new(
            snapshot.recipient.client_id,
            snapshot.recipient.phone_number,
            snapshot.recipient.name,
        )?;

        let failure = match (snapshot.failed, snapshot.failure_message, snapshot.failed_at) {
            (false, _, _) => None,
            (true, Some(message), Some(at)) => Some(Failure { message, at }),
            (true, None, _) => return Err(ValidationError::IncompleteFailure("failureMessage")),
            (true, _, None) => return Err(ValidationError::IncompleteFailure("failedAt")),
        };

        Notification::create(NotificationProps {
            id: Some(snapshot.id),
            external_id: snapshot.external_id,
            status: snapshot.status,
            channel: snapshot.channel,
            recipient,
            tries: snapshot.tries,
            created_at: snapshot.created_at,
            failure,
        })
    }
}

/// Event published by upstream systems onto the incoming queue.
///
/// Producers are inconsistent about the correlation field, so `externalId`,
/// `id` and `orderId` are all accepted (in that order of preference).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingEvent {
    pub client_id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub external_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub tries: Option<u32>,
}

impl IncomingEvent {
    pub fn parse(payload: &str) -> Result<Self, IntakeError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.external_id
            .as_deref()
            .or(self.id.as_deref())
            .or(self.order_id.as_deref())
    }

    /// Construction props for this event once its recipient is known.
    pub fn into_props(self, recipient: Recipient) -> NotificationProps {
        let external_id = self.correlation_id().map(str::to_string);
        let mut props = NotificationProps::new(recipient);
        props.external_id = external_id;
        if let Some(status) = self.status {
            props.status = status;
        }
        if let Some(channel) = self.channel {
            props.channel = channel;
        }
        props.tries = self.tries.unwrap_or(0);
        props
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;

    fn notification() -> Notification {
        let recipient = Recipient::new("c1", "+5511999990000", None).unwrap();
        let mut props = NotificationProps::new(recipient);
        props.external_id = Some("order-77".to_string());
        props.tries = 2;
        Notification::create(props).unwrap()
    }

    #[test]
    fn test_snapshot_uses_camel_case_wire_names() {
        let json = NotificationSnapshot::from(&notification()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["externalId"], "order-77");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["channel"], "SMS");
        assert_eq!(value["tries"], 2);
        assert_eq!(value["recipient"]["clientId"], "c1");
        assert_eq!(value["recipient"]["phoneNumber"], "+5511999990000");
        assert!(value["recipient"].get("name").is_none());
        assert_eq!(value["failed"], false);
    }

    #[test]
    fn test_rehydration_preserves_identity_and_failure() {
        let mut original = notification();
        original.mark_as_failed("max retries exceeded");

        let json = NotificationSnapshot::from(&original).to_json().unwrap();
        let restored = NotificationSnapshot::parse(&json).unwrap();

        assert_eq!(restored, original);
    }

    #[test]
    fn test_rehydration_rejects_unknown_status() {
        let payload = serde_json::json!({
            "id": Uuid::new_v4(),
            "status": "lost",
            "channel": "SMS",
            "tries": 1,
            "recipient": { "clientId": "c1", "phoneNumber": "+5511999990000" }
        });
        let err = NotificationSnapshot::parse(&payload.to_string()).unwrap_err();
        assert!(matches!(err, IntakeError::Validation(ValidationError::InvalidStatus(_))));
    }

    #[test]
    fn test_rehydration_rejects_incomplete_failure_marker() {
        let payload = serde_json::json!({
            "id": Uuid::new_v4(),
            "status": "pending",
            "channel": "SMS",
            "recipient": { "clientId": "c1", "phoneNumber": "+5511999990000" },
            "failed": true,
            "failureMessage": "max retries exceeded"
        });
        let err = NotificationSnapshot::parse(&payload.to_string()).unwrap_err();
        assert!(matches!(
            err,
            IntakeError::Validation(ValidationError::IncompleteFailure("failedAt"))
        ));
    }

    #[test]
    fn test_rehydration_rejects_garbage() {
        assert!(matches!(
            NotificationSnapshot::parse("{not json"),
            Err(IntakeError::Malformed(_))
        ));
    }

    #[test]
    fn test_incoming_event_defaults() {
        let event = IncomingEvent::parse(r#"{"clientId":"c1"}"#).unwrap();
        assert_eq!(event.correlation_id(), None);

        let recipient = Recipient::new("c1", "+5511999990000", None).unwrap();
        let notification = Notification::create(event.into_props(recipient)).unwrap();
        assert_eq!(notification.status(), Status::Pending);
        assert_eq!(notification.tries(), 0);
    }

    #[test]
    fn test_incoming_event_correlation_fallbacks() {
        let event = IncomingEvent::parse(r#"{"clientId":"c1","orderId":1234}"#).unwrap();
        assert_eq!(event.correlation_id(), Some("1234"));

        let event =
            IncomingEvent::parse(r#"{"clientId":"c1","id":"evt-1","externalId":"ext-9"}"#).unwrap();
        assert_eq!(event.correlation_id(), Some("ext-9"));
    }
}
