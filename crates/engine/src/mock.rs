//! In-memory collaborators for exercising the pipeline without Redis,
//! Postgres or an SMS provider.
//!
//! Every mock records what it was asked to do and can be switched into a
//! failing mode to simulate an unavailable dependency.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use herald_common::error::{DeliveryError, PersistenceError, TransportError};
use herald_common::notification::{Notification, NotificationProps, Recipient};

use crate::ports::{
    NotificationGateway, NotificationRepository, NotificationSender, RecipientRepository,
};

/// A pending SMS notification for client `c1` with the given attempt count.
pub fn sample_notification(tries: u32) -> Notification {
    let recipient = Recipient::new("c1", "+5511999990000", Some("Ana".to_string()))
        .expect("sample recipient is valid");
    let mut props = NotificationProps::new(recipient);
    props.external_id = Some("order-1".to_string());
    props.tries = tries;
    Notification::create(props).expect("sample props are valid")
}

/// Sender whose results are scripted up front. Succeeds once the script runs out.
#[derive(Default)]
pub struct MockSender {
    script: Arc<RwLock<VecDeque<Result<(), DeliveryError>>>>,
    fail_always: Arc<RwLock<bool>>,
    sent: Arc<RwLock<Vec<Notification>>>,
}

impl MockSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue up `n` consecutive provider failures.
    pub async fn fail_next(&self, n: usize) {
        let mut script = self.script.write().await;
        for _ in 0..n {
            script.push_back(Err(DeliveryError::Provider {
                status: 503,
                body: "provider unavailable".to_string(),
            }));
        }
    }

    pub async fn fail_always(&self, fail: bool) {
        *self.fail_always.write().await = fail;
    }

    /// Every notification handed to `send`, in call order.
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl NotificationSender for MockSender {
    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        self.sent.write().await.push(notification.clone());

        if *self.fail_always.read().await {
            return Err(DeliveryError::Network("connection refused".to_string()));
        }
        self.script.write().await.pop_front().unwrap_or(Ok(()))
    }
}

#[derive(Default)]
pub struct MockGateway {
    retried: Arc<RwLock<Vec<Notification>>>,
    created: Arc<RwLock<Vec<Notification>>>,
    fail_retries: Arc<RwLock<bool>>,
    fail_created: Arc<RwLock<bool>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_retries(&self, fail: bool) {
        *self.fail_retries.write().await = fail;
    }

    pub async fn fail_created(&self, fail: bool) {
        *self.fail_created.write().await = fail;
    }

    pub async fn retried(&self) -> Vec<Notification> {
        self.retried.read().await.clone()
    }

    pub async fn created(&self) -> Vec<Notification> {
        self.created.read().await.clone()
    }
}

#[async_trait]
impl NotificationGateway for MockGateway {
    async fn publish_to_retry(&self, notification: &Notification) -> Result<(), TransportError> {
        if *self.fail_retries.read().await {
            return Err(TransportError::Unavailable("retry queue unreachable".to_string()));
        }
        self.retried.write().await.push(notification.clone());
        Ok(())
    }

    async fn publish_created(&self, notification: &Notification) -> Result<(), TransportError> {
        if *self.fail_created.read().await {
            return Err(TransportError::Unavailable("creation queue unreachable".to_string()));
        }
        self.created.write().await.push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockNotificationRepository {
    saved: Arc<RwLock<Vec<Notification>>>,
    fail_saves: Arc<RwLock<bool>>,
}

impl MockNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_saves(&self, fail: bool) {
        *self.fail_saves.write().await = fail;
    }

    pub async fn saved(&self) -> Vec<Notification> {
        self.saved.read().await.clone()
    }
}

#[async_trait]
impl NotificationRepository for MockNotificationRepository {
    async fn save(&self, notification: &Notification) -> Result<(), PersistenceError> {
        if *self.fail_saves.read().await {
            return Err(PersistenceError::Unavailable("store offline".to_string()));
        }
        self.saved.write().await.push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockRecipientRepository {
    recipients: Arc<RwLock<HashMap<String, Recipient>>>,
    fail_lookups: Arc<RwLock<bool>>,
}

impl MockRecipientRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, recipient: Recipient) {
        self.recipients
            .write()
            .await
            .insert(recipient.client_id().to_string(), recipient);
    }

    pub async fn fail_lookups(&self, fail: bool) {
        *self.fail_lookups.write().await = fail;
    }
}

#[async_trait]
impl RecipientRepository for MockRecipientRepository {
    async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<Recipient>, PersistenceError> {
        if *self.fail_lookups.read().await {
            return Err(PersistenceError::Unavailable("store offline".to_string()));
        }
        Ok(self.recipients.read().await.get(client_id).cloned())
    }
}
