use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zindex_core::{Error, Result};
use crate::memory::MemoryStore;
use crate::redis_store::RedisStore;
use crate::store::SortedSetStore;

pub const MEMORY_URL: &str = "memory://";

/// Where a store lives: `memory://` or a `redis://` / `rediss://` url
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: MEMORY_URL.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn memory() -> Self {
        Self::default()
    }
}

/// Open the store described by `config`
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn SortedSetStore>> {
    let url = config.url.as_str();
    if url.starts_with(MEMORY_URL) {
        tracing::info!("Using in-memory store");
        Ok(Arc::new(MemoryStore::new()))
    } else if url.starts_with("redis://") || url.starts_with("rediss://") {
        Ok(Arc::new(RedisStore::connect(url).await?))
    } else {
        Err(Error::Configuration(format!("unsupported store url '{}'", url)))
    }
}

/// Open every store of a list, in order
pub async fn connect_all(configs: &[StoreConfig]) -> Result<Vec<Arc<dyn SortedSetStore>>> {
    let mut stores = Vec::with_capacity(configs.len());
    for config in configs {
        stores.push(connect(config).await?);
    }
    Ok(stores)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory() {
        let store = connect(&StoreConfig::default()).await.unwrap();
        assert_eq!(store.kind(), "memory");

        let stores = connect_all(&[StoreConfig::memory(), StoreConfig::memory()]).await.unwrap();
        assert_eq!(stores.len(), 2);
    }

    #[tokio::test]
    async fn test_connect_unknown_scheme() {
        let err = connect(&StoreConfig::new("mongodb://localhost")).await;
        assert!(matches!(err, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_config_serde() {
        let c: StoreConfig = serde_json::from_str(r#"{"url": "redis://127.0.0.1:6379"}"#).unwrap();
        assert_eq!(c.url, "redis://127.0.0.1:6379");
        let d: StoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(d, StoreConfig::default());
    }
}
