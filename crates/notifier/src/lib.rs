//! SMS delivery: message rendering and the Twilio-backed sender.

pub mod message;
pub mod sms;

pub use message::{MessageRenderer, OrderStatusMessage};
pub use sms::{TwilioConfig, TwilioSender};
