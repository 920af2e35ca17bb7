//! # zindex
//!
//! Secondary indexes and faceted search kept in Redis sorted sets.
//!
//! zindex turns documents into sorted-set members so that equality, prefix,
//! range, geo and full-text queries become server-side set operations:
//!
//! - **Lexicographic index**: composite keys scanned with `ZRANGEBYLEX`
//! - **Faceted full-text index**: token, numeric and geohash-cell sets combined
//!   with IDF-weighted intersections
//! - **Partitioning**: crc32 routing with deadline-bound scatter-gather
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zindex::prelude::*;
//!
//! # async fn run() -> Result<()> {
//! let engine = Engine::connect(EngineConfig::default()).await?;
//! let spec = Spec::new(vec![Field::prefix("name", true), Field::numeric("age")])?;
//! engine.create_index("users", spec, IndexKind::Simple)?;
//!
//! engine
//!     .put("users", vec![Document::new("u1").set("name", "Ada Lovelace").set("age", 36)])
//!     .await?;
//!
//! let found = engine
//!     .search(&Query::new("users").filter_prefix("name", "love"))
//!     .await?;
//! assert_eq!(found.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - [`zindex-core`](https://docs.rs/zindex-core) - Documents, specs, queries, encoders, geohash, text
//! - [`zindex-storage`](https://docs.rs/zindex-storage) - Sorted-set store contract, memory and Redis backends
//! - [`zindex-index`](https://docs.rs/zindex-index) - Simple, full-text and partitioned indexes, engine

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

// Re-export core types
pub use zindex_core::{
    Document, Entry, Field, FieldKind, Filter, GeoPoint, Op, Query, Sorting, Spec, Value,
    EncoderSet, Tokenizer, WordTokenizer, TextNormalizer, NaiveNormalizer,
    Error, Result, SearchError,
};

// Re-export storage
pub use zindex_storage::{
    DocumentStore, JsonDocumentStore, MemoryStore, RedisStore, SortedSetStore, StoreConfig,
};

// Re-export indexes
pub use zindex_index::{
    Engine, EngineConfig, FullTextFacetedIndex, IndexConfig, IndexKind, PartitionConfig,
    PartitionedIndex, PartitionedResult, ShardIndex, SimpleIndex,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Document, Entry, Field, Query, Spec, Value,
        Error, Result,
        Engine, EngineConfig, IndexKind, ShardIndex,
        MemoryStore, StoreConfig,
    };
}

/// Geohash helpers
pub mod geohash {
    pub use zindex_core::geohash::{cells_within, decode_bbox, distance, encode, neighbors};
}

/// Install a global fmt subscriber at `level` (`trace`, `debug`, `info`,
/// `warn` or `error`; anything else means `info`)
pub fn init_tracing(level: &str) -> Result<()> {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Configuration(format!("tracing already initialised: {}", e)))
}
