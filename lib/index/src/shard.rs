use async_trait::async_trait;
use std::sync::Arc;
use zindex_core::{Document, Entry, Query, Result, Spec, Tokenizer, WordTokenizer};
use zindex_storage::SortedSetStore;
use crate::config::IndexConfig;
use crate::fulltext::FullTextFacetedIndex;
use crate::simple::SimpleIndex;

/// What every index, sharded or not, can do
#[async_trait]
pub trait ShardIndex: Send + Sync {
    fn id(&self) -> &str;

    /// Index a batch, returning how many documents were written. Documents
    /// that cannot be encoded are logged and skipped.
    async fn index(&self, docs: Vec<Document>) -> Result<usize>;

    async fn get(&self, query: &Query) -> Result<Vec<Entry>>;

    /// Remove documents, returning how many were indexed
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    /// Remove the whole index, returning whether anything existed
    async fn drop_index(&self) -> Result<bool>;
}

/// Builds one single-shard index over a store
pub trait IndexFactory: Send + Sync {
    fn create(
        &self,
        name: &str,
        spec: &Spec,
        store: Arc<dyn SortedSetStore>,
        config: &IndexConfig,
    ) -> Result<Arc<dyn ShardIndex>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleIndexFactory;

impl IndexFactory for SimpleIndexFactory {
    fn create(
        &self,
        name: &str,
        spec: &Spec,
        store: Arc<dyn SortedSetStore>,
        config: &IndexConfig,
    ) -> Result<Arc<dyn ShardIndex>> {
        Ok(Arc::new(SimpleIndex::new(name, spec.clone(), store, config)?))
    }
}

#[derive(Clone)]
pub struct FullTextIndexFactory {
    tokenizer: Arc<dyn Tokenizer>,
}

impl FullTextIndexFactory {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }
}

impl Default for FullTextIndexFactory {
    fn default() -> Self {
        Self::new(Arc::new(WordTokenizer::default()))
    }
}

impl IndexFactory for FullTextIndexFactory {
    fn create(
        &self,
        name: &str,
        spec: &Spec,
        store: Arc<dyn SortedSetStore>,
        config: &IndexConfig,
    ) -> Result<Arc<dyn ShardIndex>> {
        Ok(Arc::new(FullTextFacetedIndex::new(
            name,
            spec.clone(),
            store,
            self.tokenizer.clone(),
            config,
        )?))
    }
}
