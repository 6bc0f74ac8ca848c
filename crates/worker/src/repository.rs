//! Postgres-backed repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::PersistenceError;
use herald_common::notification::{Notification, Recipient};
use herald_engine::{NotificationRepository, RecipientRepository};

#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<NotificationRow>, PersistenceError> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, external_id, status, channel, tries, recipient_id, failed, failure_message, failed_at, created_at
            FROM notifications
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    /// Insert one snapshot. A redelivered snapshot with an id already on file
    /// is ignored.
    async fn save(&self, notification: &Notification) -> Result<(), PersistenceError> {
        let tries = tries_column(notification.tries())?;
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (id, external_id, status, channel, tries, recipient_id, failed, failure_message, failed_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(notification.id())
        .bind(notification.external_id())
        .bind(notification.status().as_str())
        .bind(notification.channel().as_str())
        .bind(tries)
        .bind(notification.recipient().client_id())
        .bind(notification.is_failed())
        .bind(notification.failure_message())
        .bind(notification.failed_at())
        .bind(notification.created_at())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(notification_id = %notification.id(), "Snapshot already persisted");
        }
        Ok(())
    }
}

/// `tries` is an `INTEGER` column.
fn tries_column(tries: u32) -> Result<i32, PersistenceError> {
    i32::try_from(tries)
        .map_err(|_| PersistenceError::Invalid(format!("tries out of range: {tries}")))
}

#[derive(Clone)]
pub struct PgRecipientRepository {
    pool: PgPool,
}

impl PgRecipientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipientRepository for PgRecipientRepository {
    async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<Recipient>, PersistenceError> {
        let row: Option<(String, String, Option<String>)> = sqlx::query_as(
            "SELECT client_id, phone_number, name FROM recipients WHERE client_id = $1",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((client_id, phone_number, name)) = row else {
            return Ok(None);
        };

        match Recipient::new(client_id, phone_number, name) {
            Ok(recipient) => Ok(Some(recipient)),
            Err(e) => {
                tracing::warn!(error = %e, "Stored recipient is invalid, treating as missing");
                Ok(None)
            }
        }
    }
}

/// Row shape of `notifications`, for reading snapshots back.
#[derive(Debug, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: Uuid,
    pub external_id: Option<String>,
    pub status: String,
    pub channel: String,
    pub tries: i32,
    pub recipient_id: String,
    pub failed: bool,
    pub failure_message: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
