//! The three intake workers, one handler per queue.

pub mod persistence;
pub mod retry;
pub mod sender;

pub use persistence::PersistenceHandler;
pub use retry::RetryHandler;
pub use sender::SenderHandler;
