//! Redis-backed broker.
//!
//! Ready and inflight parts are lists, moved between with `LMOVE` so a fetched
//! message is never only in client memory. The delayed part is a sorted set
//! scored by due time in epoch milliseconds; due members are promoted on fetch.
//! Only non-blocking commands are issued since `ConnectionManager` multiplexes
//! one connection across every worker.
//!
//! Moves that depend on a removal succeeding run as Lua scripts, so a member
//! is never out of both its source and its target.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::Script;
use redis::aio::ConnectionManager;

use herald_common::error::TransportError;

use crate::broker::{
    Delivery, MessageBroker, QueueMessage, QueueOptions, dead_key, delayed_key, inflight_key,
};

/// Delayed members promoted per fetch.
const PROMOTE_BATCH: isize = 100;

/// KEYS: delayed, ready. ARGV: member.
const PROMOTE_SCRIPT: &str = r"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 1 then
    redis.call('RPUSH', KEYS[2], ARGV[1])
    return 1
end
return 0
";

/// KEYS: inflight, ready. ARGV: stored entry, replacement entry.
const RECOVER_SCRIPT: &str = r"
if redis.call('LREM', KEYS[1], 1, ARGV[1]) == 1 then
    redis.call('LPUSH', KEYS[2], ARGV[2])
    return 1
end
return 0
";

#[derive(Clone)]
pub struct RedisBroker {
    redis: ConnectionManager,
    promote: Script,
    recover: Script,
}

impl RedisBroker {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            promote: Script::new(PROMOTE_SCRIPT),
            recover: Script::new(RECOVER_SCRIPT),
        }
    }

    /// Move due members of `q:delayed` onto the tail of `q`.
    ///
    /// Several consumers may see the same due member; only the one whose
    /// `ZREM` succeeds pushes it, in the same script.
    async fn promote_due(&self, queue: &str) -> Result<usize, TransportError> {
        let mut redis = self.redis.clone();
        let delayed = delayed_key(queue);
        let now_ms = Utc::now().timestamp_millis();

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&delayed)
            .arg("-inf")
            .arg(now_ms)
            .arg("LIMIT")
            .arg(0)
            .arg(PROMOTE_BATCH)
            .query_async(&mut redis)
            .await?;

        let mut promoted = 0;
        for member in due {
            let moved: i64 = self
                .promote
                .key(&delayed)
                .key(queue)
                .arg(&member)
                .invoke_async(&mut redis)
                .await?;
            promoted += moved as usize;
        }

        if promoted > 0 {
            tracing::debug!(queue, promoted, "Promoted delayed messages");
        }
        Ok(promoted)
    }

    /// Remove `raw` from inflight and push `entry` onto `target`, atomically.
    async fn move_from_inflight(
        &self,
        queue: &str,
        raw: &str,
        target: &str,
        entry: &str,
    ) -> Result<(), TransportError> {
        let mut redis = self.redis.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(inflight_key(queue))
            .arg(1)
            .arg(raw)
            .ignore()
            .cmd("RPUSH")
            .arg(target)
            .arg(entry)
            .ignore()
            .query_async(&mut redis)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for RedisBroker {
    async fn publish(&self, queue: &str, payload: &str) -> Result<(), TransportError> {
        let mut redis = self.redis.clone();
        let entry = QueueMessage::new(payload, Utc::now()).encode()?;

        let _: i64 = redis::cmd("RPUSH")
            .arg(queue)
            .arg(entry)
            .query_async(&mut redis)
            .await?;
        Ok(())
    }

    async fn publish_delayed(
        &self,
        queue: &str,
        payload: &str,
        delay: Duration,
    ) -> Result<(), TransportError> {
        let mut redis = self.redis.clone();
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| TransportError::Unavailable(format!("invalid delay: {e}")))?;
        let due = Utc::now() + delay;
        let entry = QueueMessage::new(payload, due).encode()?;

        let _: i64 = redis::cmd("ZADD")
            .arg(delayed_key(queue))
            .arg(due.timestamp_millis())
            .arg(entry)
            .query_async(&mut redis)
            .await?;
        Ok(())
    }

    async fn fetch(
        &self,
        queue: &str,
        options: &QueueOptions,
    ) -> Result<Option<Delivery>, TransportError> {
        self.promote_due(queue).await?;

        let mut redis = self.redis.clone();
        loop {
            let raw: Option<String> = redis::cmd("LMOVE")
                .arg(queue)
                .arg(inflight_key(queue))
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut redis)
                .await?;

            let Some(raw) = raw else {
                return Ok(None);
            };

            let now = Utc::now();
            let message = QueueMessage::decode(&raw, now);
            if message.is_expired(options.message_ttl, now) {
                tracing::warn!(
                    queue,
                    message_id = %message.id,
                    enqueued_at = %message.enqueued_at,
                    "Message expired before consumption, dead-lettering"
                );
                self.move_from_inflight(queue, &raw, &dead_key(queue), &raw)
                    .await?;
                continue;
            }

            return Ok(Some(Delivery::new(queue, raw, message)));
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), TransportError> {
        let mut redis = self.redis.clone();
        let _: i64 = redis::cmd("LREM")
            .arg(inflight_key(delivery.queue()))
            .arg(1)
            .arg(delivery.raw())
            .query_async(&mut redis)
            .await?;
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), TransportError> {
        let queue = delivery.queue();
        if requeue {
            let entry = delivery.message().redelivered(Utc::now()).encode()?;
            self.move_from_inflight(queue, delivery.raw(), queue, &entry)
                .await
        } else {
            self.move_from_inflight(queue, delivery.raw(), &dead_key(queue), delivery.raw())
                .await
        }
    }

    async fn recover_inflight(&self, queue: &str) -> Result<usize, TransportError> {
        let mut redis = self.redis.clone();
        let inflight = inflight_key(queue);

        let stranded: Vec<String> = redis::cmd("LRANGE")
            .arg(&inflight)
            .arg(0)
            .arg(-1)
            .query_async(&mut redis)
            .await?;

        // Newest first, so the oldest ends up at the head.
        let now = Utc::now();
        let mut recovered = 0;
        for raw in stranded.iter().rev() {
            let entry = QueueMessage::decode(raw, now).redelivered(now).encode()?;
            let moved: i64 = self
                .recover
                .key(&inflight)
                .key(queue)
                .arg(raw)
                .arg(&entry)
                .invoke_async(&mut redis)
                .await?;
            recovered += moved as usize;
        }

        if recovered > 0 {
            tracing::warn!(queue, recovered, "Requeued unacknowledged messages");
        }
        Ok(recovered)
    }
}
