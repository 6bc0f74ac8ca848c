//! In-memory broker with the same queue layout as the Redis one.
//!
//! Time is the wall clock plus an adjustable offset, so tests can move past
//! retry delays and TTLs without sleeping.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use herald_common::error::TransportError;

use crate::broker::{Delivery, MessageBroker, QueueMessage, QueueOptions};

#[derive(Default)]
struct QueueState {
    ready: VecDeque<String>,
    inflight: Vec<String>,
    /// Sorted by due time, earliest first.
    delayed: Vec<(DateTime<Utc>, String)>,
    dead: Vec<String>,
}

impl QueueState {
    fn promote_due(&mut self, now: DateTime<Utc>) {
        let due = self.delayed.partition_point(|(at, _)| *at <= now);
        for (_, entry) in self.delayed.drain(..due) {
            self.ready.push_back(entry);
        }
    }

    fn take_inflight(&mut self, raw: &str) -> bool {
        match self.inflight.iter().position(|entry| entry == raw) {
            Some(index) => {
                self.inflight.remove(index);
                true
            }
            None => false,
        }
    }
}

#[derive(Default, Clone)]
pub struct InMemoryBroker {
    queues: Arc<Mutex<HashMap<String, QueueState>>>,
    offset: Arc<Mutex<chrono::Duration>>,
    fail_publishes: Arc<Mutex<bool>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail as if the broker were unreachable.
    pub async fn fail_publishes(&self, fail: bool) {
        *self.fail_publishes.lock().await = fail;
    }

    /// Move the broker clock forward.
    pub async fn advance(&self, by: Duration) {
        let by =
            chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let mut offset = self.offset.lock().await;
        *offset += by;
    }

    /// Push an entry as an external producer would: no frame.
    pub async fn push_raw(&self, queue: &str, entry: &str) {
        let mut queues = self.queues.lock().await;
        queues
            .entry(queue.to_string())
            .or_default()
            .ready
            .push_back(entry.to_string());
    }

    /// Payloads currently ready on `queue`, in delivery order.
    pub async fn ready(&self, queue: &str) -> Vec<String> {
        let now = self.now().await;
        self.with_queue(queue, |state| {
            state
                .ready
                .iter()
                .map(|raw| QueueMessage::decode(raw, now).payload)
                .collect()
        })
        .await
    }

    /// Payloads published with a delay that is not yet due.
    pub async fn delayed(&self, queue: &str) -> Vec<String> {
        let now = self.now().await;
        self.with_queue(queue, |state| {
            state
                .delayed
                .iter()
                .map(|(_, raw)| QueueMessage::decode(raw, now).payload)
                .collect()
        })
        .await
    }

    /// Payloads that were rejected or expired on `queue`.
    pub async fn dead(&self, queue: &str) -> Vec<String> {
        let now = self.now().await;
        self.with_queue(queue, |state| {
            state
                .dead
                .iter()
                .map(|raw| QueueMessage::decode(raw, now).payload)
                .collect()
        })
        .await
    }

    pub async fn inflight_len(&self, queue: &str) -> usize {
        self.with_queue(queue, |state| state.inflight.len()).await
    }

    async fn now(&self) -> DateTime<Utc> {
        Utc::now() + *self.offset.lock().await
    }

    async fn with_queue<T>(&self, queue: &str, f: impl FnOnce(&QueueState) -> T) -> T
    where
        T: Default,
    {
        let queues = self.queues.lock().await;
        queues.get(queue).map(f).unwrap_or_default()
    }

    async fn check_available(&self) -> Result<(), TransportError> {
        if *self.fail_publishes.lock().await {
            return Err(TransportError::Unavailable(
                "in-memory broker set to fail".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, queue: &str, payload: &str) -> Result<(), TransportError> {
        self.check_available().await?;
        let entry = QueueMessage::new(payload, self.now().await).encode()?;

        let mut queues = self.queues.lock().await;
        queues
            .entry(queue.to_string())
            .or_default()
            .ready
            .push_back(entry);
        Ok(())
    }

    async fn publish_delayed(
        &self,
        queue: &str,
        payload: &str,
        delay: Duration,
    ) -> Result<(), TransportError> {
        self.check_available().await?;
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| TransportError::Unavailable(format!("invalid delay: {e}")))?;
        let due = self.now().await + delay;
        let entry = QueueMessage::new(payload, due).encode()?;

        let mut queues = self.queues.lock().await;
        let state = queues.entry(queue.to_string()).or_default();
        let index = state.delayed.partition_point(|(at, _)| *at <= due);
        state.delayed.insert(index, (due, entry));
        Ok(())
    }

    async fn fetch(
        &self,
        queue: &str,
        options: &QueueOptions,
    ) -> Result<Option<Delivery>, TransportError> {
        let now = self.now().await;
        let mut queues = self.queues.lock().await;
        let state = queues.entry(queue.to_string()).or_default();
        state.promote_due(now);

        while let Some(raw) = state.ready.pop_front() {
            let message = QueueMessage::decode(&raw, now);
            if message.is_expired(options.message_ttl, now) {
                tracing::warn!(
                    queue,
                    message_id = %message.id,
                    "Message expired before consumption, dead-lettering"
                );
                state.dead.push(raw);
                continue;
            }

            state.inflight.push(raw.clone());
            return Ok(Some(Delivery::new(queue, raw, message)));
        }
        Ok(None)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), TransportError> {
        let mut queues = self.queues.lock().await;
        if let Some(state) = queues.get_mut(delivery.queue()) {
            state.take_inflight(delivery.raw());
        }
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), TransportError> {
        let now = self.now().await;
        let entry = delivery.message().redelivered(now).encode()?;

        let mut queues = self.queues.lock().await;
        let state = queues.entry(delivery.queue().to_string()).or_default();
        state.take_inflight(delivery.raw());
        if requeue {
            state.ready.push_back(entry);
        } else {
            state.dead.push(delivery.raw().to_string());
        }
        Ok(())
    }

    async fn recover_inflight(&self, queue: &str) -> Result<usize, TransportError> {
        let now = self.now().await;
        let mut queues = self.queues.lock().await;
        let Some(state) = queues.get_mut(queue) else {
            return Ok(0);
        };

        let stranded: Vec<String> = state.inflight.drain(..).collect();
        for raw in stranded.iter().rev() {
            let entry = QueueMessage::decode(raw, now).redelivered(now).encode()?;
            state.ready.push_front(entry);
        }
        Ok(stranded.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_and_ack() {
        let broker = InMemoryBroker::new();
        broker.publish("q", "first").await.unwrap();
        broker.publish("q", "second").await.unwrap();

        let options = QueueOptions::default();
        let first = broker.fetch("q", &options).await.unwrap().unwrap();
        assert_eq!(first.payload(), "first");
        assert_eq!(broker.inflight_len("q").await, 1);

        broker.ack(&first).await.unwrap();
        assert_eq!(broker.inflight_len("q").await, 0);
        assert_eq!(broker.ready("q").await, vec!["second".to_string()]);
    }

    #[tokio::test]
    async fn test_delayed_message_invisible_until_due() {
        let broker = InMemoryBroker::new();
        broker
            .publish_delayed("retry", "later", Duration::from_secs(600))
            .await
            .unwrap();

        let options = QueueOptions::default();
        assert!(broker.fetch("retry", &options).await.unwrap().is_none());
        assert_eq!(broker.delayed("retry").await, vec!["later".to_string()]);

        broker.advance(Duration::from_secs(599)).await;
        assert!(broker.fetch("retry", &options).await.unwrap().is_none());

        broker.advance(Duration::from_secs(1)).await;
        let delivery = broker.fetch("retry", &options).await.unwrap().unwrap();
        assert_eq!(delivery.payload(), "later");
        assert!(broker.delayed("retry").await.is_empty());
    }

    #[tokio::test]
    async fn test_expired_message_dead_lettered_on_fetch() {
        let broker = InMemoryBroker::new();
        broker.publish("create", "stale").await.unwrap();
        broker.advance(Duration::from_secs(11)).await;
        broker.publish("create", "fresh").await.unwrap();

        let options = QueueOptions::with_ttl(Duration::from_secs(10));
        let delivery = broker.fetch("create", &options).await.unwrap().unwrap();

        assert_eq!(delivery.payload(), "fresh");
        assert_eq!(broker.dead("create").await, vec!["stale".to_string()]);
    }

    #[tokio::test]
    async fn test_reject_with_and_without_requeue() {
        let broker = InMemoryBroker::new();
        broker.publish("q", "poison").await.unwrap();
        broker.publish("q", "flaky").await.unwrap();
        let options = QueueOptions::default();

        let poison = broker.fetch("q", &options).await.unwrap().unwrap();
        broker.reject(&poison, false).await.unwrap();
        assert_eq!(broker.dead("q").await, vec!["poison".to_string()]);

        let flaky = broker.fetch("q", &options).await.unwrap().unwrap();
        broker.reject(&flaky, true).await.unwrap();
        let again = broker.fetch("q", &options).await.unwrap().unwrap();
        assert_eq!(again.payload(), "flaky");
        assert_eq!(again.redeliveries(), 1);
        assert_eq!(again.message().id, flaky.message().id);
        assert_eq!(broker.inflight_len("q").await, 1);
    }

    #[tokio::test]
    async fn test_raw_entries_are_delivered_as_payload() {
        let broker = InMemoryBroker::new();
        broker.push_raw("incoming", r#"{"clientId":"c1"}"#).await;

        let delivery = broker
            .fetch("incoming", &QueueOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.payload(), r#"{"clientId":"c1"}"#);

        broker.ack(&delivery).await.unwrap();
        assert_eq!(broker.inflight_len("incoming").await, 0);
    }

    #[tokio::test]
    async fn test_recover_inflight_restores_order_ahead_of_ready() {
        let broker = InMemoryBroker::new();
        for payload in ["a", "b", "c"] {
            broker.publish("q", payload).await.unwrap();
        }
        let options = QueueOptions::default();
        let a = broker.fetch("q", &options).await.unwrap().unwrap();
        let _b = broker.fetch("q", &options).await.unwrap().unwrap();

        assert_eq!(broker.recover_inflight("q").await.unwrap(), 2);
        assert_eq!(broker.inflight_len("q").await, 0);
        assert_eq!(broker.ready("q").await, vec!["a", "b", "c"]);

        let again = broker.fetch("q", &options).await.unwrap().unwrap();
        assert_eq!(again.message().id, a.message().id);
        assert_eq!(again.redeliveries(), 1);

        // Acking the stale delivery must not touch the recovered entry.
        broker.ack(&a).await.unwrap();
        assert_eq!(broker.inflight_len("q").await, 1);
        assert_eq!(broker.recover_inflight("unknown").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unframed_entry_is_not_aged_by_ttl() {
        let broker = InMemoryBroker::new();
        broker.push_raw("create", "raw").await;
        broker.advance(Duration::from_secs(60)).await;

        let options = QueueOptions::with_ttl(Duration::from_secs(10));
        let delivery = broker.fetch("create", &options).await.unwrap().unwrap();

        assert_eq!(delivery.payload(), "raw");
        assert!(broker.dead("create").await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_injection() {
        let broker = InMemoryBroker::new();
        broker.fail_publishes(true).await;

        let result = broker.publish("q", "x").await;
        assert!(matches!(result, Err(TransportError::Unavailable(_))));
        assert!(broker.ready("q").await.is_empty());
    }
}
