//! Adlock Store Clients
//!
//! Connections to the independent key-value store instances that back the
//! quorum lock and hold the shared record. `RedisStore` talks to Redis;
//! `MemoryStore` is an in-process stand-in used in tests.

pub mod client;
pub mod config;
pub mod connection;
pub mod memory;

pub use client::{StoreClient, StoreError, StoreResult};
pub use config::{ReconnectPolicy, StoreConfig};
pub use connection::RedisStore;
pub use memory::MemoryStore;
