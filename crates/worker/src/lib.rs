pub mod consumer;
pub mod handlers;
pub mod pipeline;
pub mod repository;

pub use consumer::{Acknowledgement, Consumer, ConsumerGroup, ConsumerOptions, MessageHandler};
pub use pipeline::{Pipeline, PipelineSettings};
pub use repository::{PgNotificationRepository, PgRecipientRepository};
