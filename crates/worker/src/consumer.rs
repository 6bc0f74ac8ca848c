//! Queue consumer loop shared by the three intake workers.
//!
//! One consumer binds one handler to one queue. Concurrency is bounded by a
//! semaphore sized to the queue's prefetch: a message is only fetched once a
//! permit is free, and the permit travels with the spawned handler task.
//!
//! Messages left unacknowledged by a previous run are requeued before the
//! first fetch. A handler that panics counts as a requeue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;

use herald_common::error::TransportError;
use herald_queue::{Delivery, MessageBroker, QueueOptions};

/// What to do with a message once its handler is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    Ack,
    /// Dead-letter, never redeliver.
    Reject,
    /// Back onto the queue for another attempt.
    Requeue,
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn handle(&self, payload: &str) -> Acknowledgement;
}

#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub queue: String,
    pub prefetch: usize,
    pub poll_interval: Duration,
    pub max_redeliveries: u32,
    pub queue_options: QueueOptions,
}

impl ConsumerOptions {
    pub fn new(queue: impl Into<String>, prefetch: usize) -> Self {
        Self {
            queue: queue.into(),
            prefetch: prefetch.max(1),
            poll_interval: Duration::from_millis(500),
            max_redeliveries: 5,
            queue_options: QueueOptions::default(),
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn max_redeliveries(mut self, max: u32) -> Self {
        self.max_redeliveries = max;
        self
    }

    pub fn message_ttl(mut self, ttl: Duration) -> Self {
        self.queue_options = QueueOptions::with_ttl(ttl);
        self
    }
}

#[derive(Clone)]
pub struct Consumer {
    broker: Arc<dyn MessageBroker>,
    handler: Arc<dyn MessageHandler>,
    options: ConsumerOptions,
}

impl Consumer {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        handler: Arc<dyn MessageHandler>,
        options: ConsumerOptions,
    ) -> Self {
        Self {
            broker,
            handler,
            options,
        }
    }

    /// Fetch and fully process at most one message on the current task.
    ///
    /// Returns whether a message was found.
    pub async fn poll_once(&self) -> Result<bool, TransportError> {
        let Some(delivery) = self
            .broker
            .fetch(&self.options.queue, &self.options.queue_options)
            .await?
        else {
            return Ok(false);
        };

        process(
            self.broker.as_ref(),
            self.handler.clone(),
            &delivery,
            self.options.max_redeliveries,
        )
        .await?;
        Ok(true)
    }

    /// Requeue whatever a previous run of this queue left unacknowledged.
    pub async fn recover(&self) -> Result<usize, TransportError> {
        self.broker.recover_inflight(&self.options.queue).await
    }

    /// Consume until `shutdown` flips to `true`, then wait for in-flight
    /// handlers to finish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let queue = self.options.queue.clone();
        let worker = self.handler.name();
        let permits = Arc::new(Semaphore::new(self.options.prefetch));

        tracing::info!(
            worker,
            queue = %queue,
            prefetch = self.options.prefetch,
            "Consumer started"
        );

        match self.recover().await {
            Ok(0) => {}
            Ok(recovered) => {
                tracing::info!(worker, queue = %queue, recovered, "Requeued stranded messages")
            }
            Err(e) => {
                tracing::error!(worker, queue = %queue, error = %e, "Inflight recovery failed")
            }
        }

        loop {
            // A dropped sender counts as a shutdown request.
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                break;
            }

            let permit = tokio::select! {
                _ = shutdown.changed() => continue,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let delivery = match self
                .broker
                .fetch(&queue, &self.options.queue_options)
                .await
            {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    drop(permit);
                    self.idle(&mut shutdown).await;
                    continue;
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!(worker, queue = %queue, error = %e, "Fetch failed");
                    self.idle(&mut shutdown).await;
                    continue;
                }
            };

            let broker = self.broker.clone();
            let handler = self.handler.clone();
            let max_redeliveries = self.options.max_redeliveries;
            tokio::spawn(async move {
                if let Err(e) =
                    process(broker.as_ref(), handler.clone(), &delivery, max_redeliveries).await
                {
                    tracing::error!(
                        worker = handler.name(),
                        queue = %delivery.queue(),
                        error = %e,
                        "Acknowledgement failed"
                    );
                }
                drop(permit);
            });
        }

        // Every permit back means every spawned handler has finished.
        let _ = permits.acquire_many(self.options.prefetch as u32).await;
        tracing::info!(worker, queue = %queue, "Consumer stopped");
    }

    async fn idle(&self, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = shutdown.changed() => {}
            _ = tokio::time::sleep(self.options.poll_interval) => {}
        }
    }
}

async fn process(
    broker: &dyn MessageBroker,
    handler: Arc<dyn MessageHandler>,
    delivery: &Delivery,
    max_redeliveries: u32,
) -> Result<(), TransportError> {
    let task = {
        let handler = handler.clone();
        let payload = delivery.payload().to_string();
        tokio::spawn(async move { handler.handle(&payload).await })
    };

    let decision = match task.await {
        Ok(decision) => decision,
        Err(e) => {
            tracing::error!(
                worker = handler.name(),
                queue = %delivery.queue(),
                message_id = %delivery.message().id,
                error = %e,
                "Handler panicked, requeueing"
            );
            Acknowledgement::Requeue
        }
    };

    match decision {
        Acknowledgement::Ack => broker.ack(delivery).await,
        Acknowledgement::Reject => broker.reject(delivery, false).await,
        Acknowledgement::Requeue if delivery.redeliveries() >= max_redeliveries => {
            tracing::warn!(
                worker = handler.name(),
                queue = %delivery.queue(),
                message_id = %delivery.message().id,
                redeliveries = delivery.redeliveries(),
                "Redelivery limit reached, dead-lettering"
            );
            broker.reject(delivery, false).await
        }
        Acknowledgement::Requeue => broker.reject(delivery, true).await,
    }
}

/// Running consumers sharing one shutdown signal.
pub struct ConsumerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl ConsumerGroup {
    pub fn spawn(consumers: Vec<Consumer>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let joins = consumers
            .into_iter()
            .map(|consumer| tokio::spawn(consumer.run(shutdown_rx.clone())))
            .collect();

        Self { shutdown_tx, joins }
    }

    /// Stop fetching everywhere and wait for in-flight messages to settle.
    pub async fn shutdown_and_join(self) {
        let _ = self.shutdown_tx.send(true);
        for join in self.joins {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "Consumer task panicked");
            }
        }
    }
}
