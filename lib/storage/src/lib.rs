//! # zindex Storage
//!
//! The backing-store contract the indexes are written against, and its
//! backends:
//!
//! - [`SortedSetStore`] - Executes a [`Pipeline`] of [`Command`]s
//! - [`MemoryStore`] - In-process keyspace, used by tests
//! - [`RedisStore`] - Redis over a multiplexed `ConnectionManager`
//! - [`JsonDocumentStore`] - Full documents as JSON strings

pub mod command;
pub mod store;
pub mod memory;
pub mod redis_store;
pub mod config;
pub mod document_store;

pub use command::{Aggregate, Command, Pipeline, Reply, ScoreBound};
pub use store::SortedSetStore;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use config::{connect, connect_all, StoreConfig};
pub use document_store::{DocumentStore, JsonDocumentStore};
