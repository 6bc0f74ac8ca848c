//! Wiring of the dispatch pipeline onto its three queues.

use std::sync::Arc;
use std::time::Duration;

use herald_common::config::AppConfig;
use herald_engine::{
    CreationPublisher, Dispatcher, NotificationRepository, NotificationSender,
    RecipientRepository, RetryScheduler,
};
use herald_queue::{BrokerGateway, MessageBroker};

use crate::consumer::{Consumer, ConsumerOptions};
use crate::handlers::{PersistenceHandler, RetryHandler, SenderHandler};

/// Queue names and per-queue limits.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub incoming_queue: String,
    pub retry_queue: String,
    pub persistence_queue: String,
    pub retry_delay: Duration,
    pub persistence_ttl: Duration,
    pub sender_prefetch: usize,
    pub retry_prefetch: usize,
    pub persistence_prefetch: usize,
    pub poll_interval: Duration,
    pub max_redeliveries: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            incoming_queue: "notification-incoming-queue".to_string(),
            retry_queue: "notification-retry-queue".to_string(),
            persistence_queue: "notification-create-queue".to_string(),
            retry_delay: Duration::from_secs(600),
            persistence_ttl: Duration::from_secs(10),
            sender_prefetch: 1,
            retry_prefetch: 1,
            persistence_prefetch: 5,
            poll_interval: Duration::from_millis(500),
            max_redeliveries: 5,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            incoming_queue: config.incoming_queue.clone(),
            retry_queue: config.retry_queue.clone(),
            persistence_queue: config.persistence_queue.clone(),
            retry_delay: config.retry_delay(),
            persistence_ttl: config.persistence_ttl(),
            sender_prefetch: config.sender_prefetch,
            retry_prefetch: config.retry_prefetch,
            persistence_prefetch: config.persistence_prefetch,
            poll_interval: config.poll_interval(),
            max_redeliveries: config.max_redeliveries,
        }
    }
}

/// One consumer per intake worker, sharing a single dispatcher.
pub struct Pipeline {
    pub sender: Consumer,
    pub retry: Consumer,
    pub persistence: Consumer,
}

impl Pipeline {
    pub fn build(
        settings: &PipelineSettings,
        broker: Arc<dyn MessageBroker>,
        delivery: Arc<dyn NotificationSender>,
        notifications: Arc<dyn NotificationRepository>,
        recipients: Arc<dyn RecipientRepository>,
    ) -> Self {
        // Announcements of delivered notifications land on the persistence queue.
        let gateway = Arc::new(BrokerGateway::new(
            broker.clone(),
            settings.retry_queue.clone(),
            settings.persistence_queue.clone(),
            settings.retry_delay,
        ));

        let dispatcher = Arc::new(Dispatcher::new(
            delivery,
            RetryScheduler::new(gateway.clone(), notifications.clone()),
            CreationPublisher::new(gateway, notifications.clone()),
        ));

        let options = |queue: &str, prefetch: usize| {
            ConsumerOptions::new(queue, prefetch)
                .poll_interval(settings.poll_interval)
                .max_redeliveries(settings.max_redeliveries)
        };

        Self {
            sender: Consumer::new(
                broker.clone(),
                Arc::new(SenderHandler::new(recipients, dispatcher.clone())),
                options(settings.incoming_queue.as_str(), settings.sender_prefetch),
            ),
            retry: Consumer::new(
                broker.clone(),
                Arc::new(RetryHandler::new(dispatcher)),
                options(settings.retry_queue.as_str(), settings.retry_prefetch),
            ),
            persistence: Consumer::new(
                broker,
                Arc::new(PersistenceHandler::new(notifications)),
                options(settings.persistence_queue.as_str(), settings.persistence_prefetch)
                    .message_ttl(settings.persistence_ttl),
            ),
        }
    }

    pub fn into_consumers(self) -> Vec<Consumer> {
        vec![self.sender, self.retry, self.persistence]
    }
}
