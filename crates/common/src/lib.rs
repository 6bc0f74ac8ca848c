//! Shared building blocks for the Herald notification pipeline.
//!
//! - `notification`: the `Notification` aggregate and its embedded `Recipient`
//! - `snapshot`: queue payloads and the validating rehydration path
//! - `types`: status and channel enumerations
//! - `error`: error taxonomy shared by every crate
//! - `config`, `db`, `redis_pool`: process wiring helpers

pub mod config;
pub mod db;
pub mod error;
pub mod notification;
pub mod redis_pool;
pub mod snapshot;
pub mod types;
