use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use zindex_core::{BucketConfig, Result};
use zindex_storage::StoreConfig;

/// Per-index tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Lifetime of the temporary sets a full-text query creates
    pub temp_key_ttl_secs: u64,
    /// Corpus size assumed by the IDF weighting
    pub total_docs_estimate: f64,
    pub buckets: BucketConfig,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            temp_key_ttl_secs: 60,
            total_docs_estimate: 1_000_000.0,
            buckets: BucketConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub num_partitions: usize,
    /// Deadline for a scatter-gather read
    pub timeout_ms: u64,
    /// Shards queried at once, 0 meaning all of them
    pub concurrency: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            num_partitions: 1,
            timeout_ms: 500,
            concurrency: 0,
        }
    }
}

impl PartitionConfig {
    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[inline]
    pub fn effective_concurrency(&self) -> usize {
        if self.concurrency == 0 {
            self.num_partitions.max(1)
        } else {
            self.concurrency
        }
    }
}

/// Everything needed to stand up an engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Stores the partitions are spread over, round robin
    pub stores: Vec<StoreConfig>,
    /// Store holding the JSON documents
    pub documents: StoreConfig,
    pub index: IndexConfig,
    pub partitions: PartitionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stores: vec![StoreConfig::default()],
            documents: StoreConfig::default(),
            index: IndexConfig::default(),
            partitions: PartitionConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}
