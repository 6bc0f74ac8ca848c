use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Redis connection string (message transport)
    pub redis_url: String,

    /// Queue carrying new notification events
    pub incoming_queue: String,

    /// Queue carrying notifications waiting for another delivery attempt
    pub retry_queue: String,

    /// Queue carrying terminal snapshots to be persisted
    pub persistence_queue: String,

    /// Delay before a scheduled retry becomes visible (default: 10 minutes)
    pub retry_queue_ttl_ms: u64,

    /// Age after which an unconsumed persistence message is dead-lettered (default: 10 seconds)
    pub persistence_queue_ttl_ms: u64,

    /// Unacknowledged messages the sender worker may hold (default: 1)
    pub sender_prefetch: usize,

    /// Unacknowledged messages the retry worker may hold (default: 1)
    pub retry_prefetch: usize,

    /// Unacknowledged messages the persistence worker may hold (default: 5)
    pub persistence_prefetch: usize,

    /// Idle poll interval for empty queues in milliseconds (default: 500)
    pub queue_poll_interval_ms: u64,

    /// Requeues allowed before a message is dead-lettered (default: 5)
    pub max_redeliveries: u32,

    /// Twilio account SID
    pub twilio_account_sid: String,

    /// Twilio auth token
    pub twilio_auth_token: String,

    /// Sender phone number registered with Twilio
    pub twilio_phone_number: String,

    /// Twilio REST API base URL
    pub twilio_api_base_url: String,

    /// Timeout for a single SMS provider call in seconds (default: 10)
    pub sms_timeout_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 20)?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            incoming_queue: std::env::var("INCOMING_QUEUE")
                .unwrap_or_else(|_| "notification-incoming-queue".to_string()),
            retry_queue: std::env::var("RETRY_QUEUE")
                .unwrap_or_else(|_| "notification-retry-queue".to_string()),
            persistence_queue: std::env::var("PERSISTENCE_QUEUE")
                .unwrap_or_else(|_| "notification-create-queue".to_string()),
            retry_queue_ttl_ms: parse_or("RETRY_QUEUE_TTL_MS", 600_000)?,
            persistence_queue_ttl_ms: parse_or("PERSISTENCE_QUEUE_TTL_MS", 10_000)?,
            sender_prefetch: parse_or("SENDER_PREFETCH", 1)?,
            retry_prefetch: parse_or("RETRY_PREFETCH", 1)?,
            persistence_prefetch: parse_or("PERSISTENCE_PREFETCH", 5)?,
            queue_poll_interval_ms: parse_or("QUEUE_POLL_INTERVAL_MS", 500)?,
            max_redeliveries: parse_or("MAX_REDELIVERIES", 5)?,
            twilio_account_sid: required("TWILIO_ACCOUNT_SID")?,
            twilio_auth_token: required("TWILIO_AUTH_TOKEN")?,
            twilio_phone_number: required("TWILIO_PHONE_NUMBER")?,
            twilio_api_base_url: std::env::var("TWILIO_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.twilio.com".to_string()),
            sms_timeout_secs: parse_or("SMS_TIMEOUT_SECS", 10)?,
        })
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_queue_ttl_ms)
    }

    pub fn persistence_ttl(&self) -> Duration {
        Duration::from_millis(self.persistence_queue_ttl_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue_poll_interval_ms)
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("{key} environment variable is required"))
}

fn parse_or<T: FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_falls_back_to_default() {
        let value: u64 = parse_or("HERALD_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_or_rejects_garbage() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("HERALD_TEST_GARBAGE_PREFETCH", "lots") };
        let result: anyhow::Result<usize> = parse_or("HERALD_TEST_GARBAGE_PREFETCH", 1);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("HERALD_TEST_GARBAGE_PREFETCH"));
    }

    #[test]
    fn test_required_reports_missing_key() {
        let err = required("HERALD_TEST_MISSING_REQUIRED").unwrap_err();
        assert_eq!(
            err.to_string(),
            "HERALD_TEST_MISSING_REQUIRED environment variable is required"
        );
    }
}
