//! # zindex Index
//!
//! Indexes stored as sorted sets in a [`zindex_storage::SortedSetStore`]:
//!
//! - [`SimpleIndex`] - One lexicographic set per index, composite keys in spec order
//! - [`FullTextFacetedIndex`] - One set per token, numeric field and geohash cell
//! - [`PartitionedIndex`] - crc32-routed shards with deadline-bound scatter-gather
//! - [`Engine`] - Named indexes plus the document store

pub mod config;
mod registry;
pub mod shard;
pub mod simple;
pub mod fulltext;
pub mod partitioned;
pub mod engine;

pub use config::{EngineConfig, IndexConfig, PartitionConfig};
pub use shard::{FullTextIndexFactory, IndexFactory, ShardIndex, SimpleIndexFactory};
pub use simple::{decode_entry, LexRange, SimpleIndex};
pub use fulltext::{FullTextFacetedIndex, PlanContext, Step};
pub use partitioned::{partition_for, PartitionedIndex, PartitionedResult};
pub use engine::{Engine, IndexKind};
