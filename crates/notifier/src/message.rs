use herald_common::notification::Notification;
use herald_common::types::Status;

/// Turns a notification into the text sent to its recipient.
pub trait MessageRenderer: Send + Sync {
    fn render(&self, notification: &Notification) -> String;
}

/// Order status update, addressed by name when the recipient has one.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderStatusMessage;

impl OrderStatusMessage {
    fn status_text(status: Status) -> &'static str {
        match status {
            Status::Pending => "Pending",
            Status::Accepted => "Accepted",
            Status::Finished => "Finished",
            Status::Canceled => "Canceled",
        }
    }
}

impl MessageRenderer for OrderStatusMessage {
    fn render(&self, notification: &Notification) -> String {
        let greeting = match notification.recipient().name() {
            Some(name) => format!("Hello, {name}!"),
            None => "Hello!".to_string(),
        };
        let status = Self::status_text(notification.status());

        match notification.external_id() {
            Some(order) => format!(
                "{greeting} Your order status is now: {status}. Track it with number: {order}."
            ),
            None => format!("{greeting} Your order status is now: {status}."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_common::notification::{NotificationProps, Recipient};

    fn notification(name: Option<&str>, external_id: Option<&str>, status: &str) -> Notification {
        let recipient =
            Recipient::new("c1", "+5511999990000", name.map(str::to_string)).unwrap();
        let mut props = NotificationProps::new(recipient);
        props.external_id = external_id.map(str::to_string);
        props.status = status.to_string();
        Notification::create(props).unwrap()
    }

    #[test]
    fn test_render_with_name_and_order() {
        let text = OrderStatusMessage.render(&notification(Some("Ana"), Some("A-42"), "accepted"));
        assert_eq!(
            text,
            "Hello, Ana! Your order status is now: Accepted. Track it with number: A-42."
        );
    }

    #[test]
    fn test_render_without_name() {
        let text = OrderStatusMessage.render(&notification(None, Some("A-42"), "canceled"));
        assert!(text.starts_with("Hello! "));
        assert!(text.contains("Canceled"));
        assert!(text.contains("A-42"));
    }

    #[test]
    fn test_render_without_order_number() {
        let text = OrderStatusMessage.render(&notification(Some("Ana"), None, "pending"));
        assert_eq!(text, "Hello, Ana! Your order status is now: Pending.");
    }
}
