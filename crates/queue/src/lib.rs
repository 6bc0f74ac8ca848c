pub mod broker;
pub mod gateway;
pub mod memory;
pub mod redis_broker;

pub use broker::{Delivery, MessageBroker, QueueMessage, QueueOptions};
pub use gateway::BrokerGateway;
pub use memory::InMemoryBroker;
pub use redis_broker::RedisBroker;
