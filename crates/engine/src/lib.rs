pub mod dispatcher;
pub mod mock;
pub mod ports;
pub mod publisher;
pub mod retry;

pub use dispatcher::Dispatcher;
pub use ports::{
    NotificationGateway, NotificationRepository, NotificationSender, RecipientRepository,
};
pub use publisher::{CreationOutcome, CreationPublisher};
pub use retry::{RetryError, RetryOutcome, RetryScheduler};
