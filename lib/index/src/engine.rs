use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use zindex_core::{Document, Entry, Error, Query, Result, Spec};
use zindex_storage::{connect, connect_all, DocumentStore, JsonDocumentStore, SortedSetStore};
use crate::config::EngineConfig;
use crate::partitioned::PartitionedIndex;
use crate::shard::{FullTextIndexFactory, IndexFactory, ShardIndex, SimpleIndexFactory};

/// Which single-shard index backs a named index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Simple,
    FullText,
}

/// Named indexes over shared stores, plus the documents they point at
pub struct Engine {
    indexes: Arc<RwLock<HashMap<String, Arc<dyn ShardIndex>>>>,
    stores: Vec<Arc<dyn SortedSetStore>>,
    documents: Arc<dyn DocumentStore>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        stores: Vec<Arc<dyn SortedSetStore>>,
        documents: Arc<dyn DocumentStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        if stores.is_empty() {
            return Err(Error::Configuration("engine needs at least one store".to_string()));
        }
        Ok(Self {
            indexes: Arc::new(RwLock::new(HashMap::new())),
            stores,
            documents,
            config,
        })
    }

    /// Open every store named by `config`
    pub async fn connect(config: EngineConfig) -> Result<Self> {
        let stores = connect_all(&config.stores).await?;
        let documents = Arc::new(JsonDocumentStore::new(connect(&config.documents).await?));
        tracing::info!(
            "Engine ready with {} index store(s), {} partition(s) per index",
            stores.len(),
            config.partitions.num_partitions
        );
        Self::new(stores, documents, config)
    }

    /// Build and register an index. More than one configured partition
    /// gives a partitioned index over the stores.
    pub fn create_index(&self, name: &str, spec: Spec, kind: IndexKind) -> Result<Arc<dyn ShardIndex>> {
        let factory: Box<dyn IndexFactory> = match kind {
            IndexKind::Simple => Box::new(SimpleIndexFactory),
            IndexKind::FullText => Box::new(FullTextIndexFactory::default()),
        };

        let mut indexes = self.indexes.write();
        if indexes.contains_key(name) {
            return Err(Error::Configuration(format!("index '{}' already exists", name)));
        }

        let index: Arc<dyn ShardIndex> = if self.config.partitions.num_partitions > 1 {
            Arc::new(PartitionedIndex::new(
                name,
                &spec,
                factory.as_ref(),
                &self.stores,
                &self.config.index,
                self.config.partitions.clone(),
            )?)
        } else {
            factory.create(name, &spec, self.stores[0].clone(), &self.config.index)?
        };

        indexes.insert(name.to_string(), index.clone());
        tracing::debug!("Created {:?} index '{}'", kind, name);
        Ok(index)
    }

    /// Register an index built elsewhere under its own id
    pub fn register(&self, index: Arc<dyn ShardIndex>) -> Result<()> {
        let mut indexes = self.indexes.write();
        let name = index.id().to_string();
        if indexes.contains_key(&name) {
            return Err(Error::Configuration(format!("index '{}' already exists", name)));
        }
        indexes.insert(name, index);
        Ok(())
    }

    pub fn get_index(&self, name: &str) -> Result<Arc<dyn ShardIndex>> {
        self.indexes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }

    #[inline]
    #[must_use]
    pub fn list_indexes(&self) -> Vec<String> {
        self.indexes.read().keys().cloned().collect()
    }

    #[inline]
    #[must_use]
    pub fn index_exists(&self, name: &str) -> bool {
        self.indexes.read().contains_key(name)
    }

    #[inline]
    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    /// Store the documents, then index them
    pub async fn put(&self, name: &str, docs: Vec<Document>) -> Result<usize> {
        let index = self.get_index(name)?;
        self.documents.store(&docs).await?;
        index.index(docs).await
    }

    pub async fn index(&self, name: &str, docs: Vec<Document>) -> Result<usize> {
        self.get_index(name)?.index(docs).await
    }

    /// Index a document stream in chunks of `chunk`, until the iterator ends
    pub async fn index_stream<I>(&self, name: &str, docs: I, chunk: usize) -> Result<usize>
    where
        I: IntoIterator<Item = Document>,
    {
        let index = self.get_index(name)?;
        let mut docs = docs.into_iter();
        let mut total = 0;
        loop {
            let batch: Vec<Document> = docs.by_ref().take(chunk.max(1)).collect();
            if batch.is_empty() {
                break;
            }
            total += index.index(batch).await?;
        }
        Ok(total)
    }

    /// Like [`Engine::index_stream`], storing every chunk first
    pub async fn put_stream<I>(&self, name: &str, docs: I, chunk: usize) -> Result<usize>
    where
        I: IntoIterator<Item = Document>,
    {
        let index = self.get_index(name)?;
        let mut docs = docs.into_iter();
        let mut total = 0;
        loop {
            let batch: Vec<Document> = docs.by_ref().take(chunk.max(1)).collect();
            if batch.is_empty() {
                break;
            }
            self.documents.store(&batch).await?;
            total += index.index(batch).await?;
        }
        Ok(total)
    }

    pub async fn search_ids(&self, query: &Query) -> Result<Vec<Entry>> {
        self.get_index(&query.index_name)?.get(query).await
    }

    /// Matching documents, best first. Ids whose document is gone are skipped.
    pub async fn search(&self, query: &Query) -> Result<Vec<Document>> {
        let entries = self.search_ids(query).await?;
        let ids: Vec<String> = entries.into_iter().map(|e| e.id).collect();
        self.documents.load(&ids).await
    }

    /// Remove documents from an index and from the document store
    pub async fn delete(&self, name: &str, ids: &[String]) -> Result<usize> {
        let removed = self.get_index(name)?.delete(ids).await?;
        self.documents.delete(ids).await?;
        Ok(removed)
    }

    /// Drop an index's data and forget it
    pub async fn drop_index(&self, name: &str) -> Result<bool> {
        let index = self.get_index(name)?;
        let dropped = index.drop_index().await?;
        self.indexes.write().remove(name);
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zindex_core::Field;
    use zindex_storage::MemoryStore;
    use crate::config::PartitionConfig;

    fn engine(num_partitions: usize) -> Engine {
        let stores: Vec<Arc<dyn SortedSetStore>> = vec![Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new())];
        let documents = Arc::new(JsonDocumentStore::new(Arc::new(MemoryStore::new())));
        let config = EngineConfig {
            partitions: PartitionConfig {
                num_partitions,
                ..Default::default()
            },
            ..Default::default()
        };
        Engine::new(stores, documents, config).unwrap()
    }

    fn docs() -> Vec<Document> {
        vec![
            Document::with_score("doc1", 1.0).set("foo", "hello world"),
            Document::with_score("doc2", 3.0).set("foo", "hello werld"),
            Document::with_score("doc3", 2.0).set("foo", "jello world"),
        ]
    }

    #[tokio::test]
    async fn test_put_and_search() {
        let engine = engine(3);
        engine
            .create_index("users", Spec::new(vec![Field::prefix("foo", true)]).unwrap(), IndexKind::Simple)
            .unwrap();
        assert_eq!(engine.put("users", docs()).await.unwrap(), 3);

        for doc in docs() {
            let value = doc.property("foo").unwrap().clone();
            let q = Query::new("users").filter_equals("foo", value);
            let found = engine.search(&q).await.unwrap();
            assert_eq!(found, vec![doc]);
        }

        let ids = engine.search_ids(&Query::new("users").filter_prefix("foo", "hell")).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].id, "doc2");
        assert_eq!(ids[0].score, 3.0);
    }

    #[tokio::test]
    async fn test_streams() {
        let engine = engine(1);
        let spec = Spec::new(vec![Field::fulltext("body", ["text"]), Field::numeric("n")]).unwrap();
        engine.create_index("notes", spec, IndexKind::FullText).unwrap();

        let stream = (0..25).map(|i| Document::new(format!("n{}", i)).set("text", "shared words").set("n", i));
        assert_eq!(engine.put_stream("notes", stream, 10).await.unwrap(), 25);

        let q = Query::new("notes").filter_matches("text", "words").filter_less_than("n", 5).limit(0, 100);
        let found = engine.search(&q).await.unwrap();
        assert_eq!(found.len(), 5);

        let extra = (25..30).map(|i| Document::new(format!("n{}", i)).set("text", "shared words").set("n", i));
        assert_eq!(engine.index_stream("notes", extra, 0).await.unwrap(), 5);
        let ids = engine.search_ids(&q.clone().filter_greater_equal("n", 25)).await.unwrap();
        assert!(ids.is_empty());
        let q = Query::new("notes").filter_greater_equal("n", 25).limit(0, 100);
        let ids = engine.search_ids(&q).await.unwrap();
        assert_eq!(ids.len(), 5);
        // indexed without storing
        assert!(engine.search(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_index() {
        let engine = engine(1);
        assert!(matches!(engine.index("nope", docs()).await, Err(Error::IndexNotFound(_))));
        assert!(matches!(
            engine.search(&Query::new("nope")).await,
            Err(Error::IndexNotFound(_))
        ));
        assert!(matches!(engine.drop_index("nope").await, Err(Error::IndexNotFound(_))));
    }

    #[tokio::test]
    async fn test_create_register_drop() {
        let engine = engine(1);
        let spec = Spec::new(vec![Field::prefix("foo", false)]).unwrap();
        engine.create_index("a", spec.clone(), IndexKind::Simple).unwrap();
        assert!(matches!(
            engine.create_index("a", spec.clone(), IndexKind::Simple),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            engine.create_index("b", spec, IndexKind::FullText),
            Err(Error::Configuration(_))
        ));

        engine.index("a", docs()).await.unwrap();
        assert!(engine.index_exists("a"));
        assert!(engine.drop_index("a").await.unwrap());
        assert!(!engine.index_exists("a"));
        assert!(engine.list_indexes().is_empty());

        let store: Arc<dyn SortedSetStore> = Arc::new(MemoryStore::new());
        let custom = SimpleIndexFactory
            .create("custom", &Spec::new(vec![Field::numeric("n")]).unwrap(), store, &Default::default())
            .unwrap();
        engine.register(custom.clone()).unwrap();
        assert!(engine.register(custom).is_err());
        assert_eq!(engine.list_indexes(), vec!["custom"]);
    }

    #[tokio::test]
    async fn test_delete_removes_documents() {
        let engine = engine(2);
        engine
            .create_index("users", Spec::new(vec![Field::prefix("foo", false)]).unwrap(), IndexKind::Simple)
            .unwrap();
        engine.put("users", docs()).await.unwrap();

        assert_eq!(engine.delete("users", &["doc1".to_string()]).await.unwrap(), 1);
        let found = engine.search(&Query::new("users").filter_prefix("foo", "hello")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), "doc2");
        assert!(engine.documents().load(&["doc1".to_string()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_memory() {
        let engine = Engine::connect(EngineConfig::default()).await.unwrap();
        assert!(engine.list_indexes().is_empty());
    }
}
