use thiserror::Error;

/// Bad construction input. Fatal to the message that carried it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid notification status \"{0}\": must be one of pending, accepted, finished, canceled")]
    InvalidStatus(String),

    #[error("Unsupported notification channel \"{0}\"")]
    UnknownChannel(String),

    #[error("Recipient clientId is required")]
    MissingClientId,

    #[error("Recipient phoneNumber is required")]
    MissingPhoneNumber,

    #[error("Failed notification is missing {0}")]
    IncompleteFailure(&'static str),
}

/// Broker unavailable or payload could not be framed for transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

/// Delivery channel failure. Never classified as transient or permanent:
/// every variant is retried up to the attempt ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("Provider rejected message: HTTP {status}")]
    Provider { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),
}

/// Store write or lookup failure. Not retried automatically.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Value cannot be stored: {0}")]
    Invalid(String),
}

/// Failure while turning an inbound queue message into a dispatched
/// notification. Workers translate it into an acknowledge/reject decision.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Recipient not found for clientId {0}")]
    RecipientNotFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}
