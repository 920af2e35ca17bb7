use async_trait::async_trait;
use std::sync::Arc;
use zindex_core::{Document, Error, Result};
use crate::command::Pipeline;
use crate::store::SortedSetStore;

/// Keeps the full documents the indexes only reference by id
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn store(&self, docs: &[Document]) -> Result<()>;

    /// Documents for `ids` in request order; missing ids are skipped
    async fn load(&self, ids: &[String]) -> Result<Vec<Document>>;

    /// Returns how many documents were removed
    async fn delete(&self, ids: &[String]) -> Result<usize>;
}

/// JSON documents under `d:{id}`
#[derive(Clone)]
pub struct JsonDocumentStore {
    store: Arc<dyn SortedSetStore>,
}

impl JsonDocumentStore {
    pub fn new(store: Arc<dyn SortedSetStore>) -> Self {
        Self { store }
    }

    #[inline]
    fn key(id: &str) -> String {
        format!("d:{}", id)
    }
}

#[async_trait]
impl DocumentStore for JsonDocumentStore {
    async fn store(&self, docs: &[Document]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let mut pipeline = Pipeline::new();
        for doc in docs {
            pipeline.set(Self::key(doc.id()), serde_json::to_vec(doc)?);
        }
        self.store.execute(pipeline).await?;
        tracing::debug!("Stored {} documents", docs.len());
        Ok(())
    }

    async fn load(&self, ids: &[String]) -> Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipeline = Pipeline::new();
        pipeline.mget(ids.iter().map(|id| Self::key(id)).collect());

        let values = self
            .store
            .execute(pipeline)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Store("missing MGET reply".to_string()))?
            .into_values()?;

        let mut docs = Vec::with_capacity(values.len());
        for raw in values.into_iter().flatten() {
            docs.push(serde_json::from_slice(&raw)?);
        }
        Ok(docs)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut pipeline = Pipeline::new();
        pipeline.del(ids.iter().map(|id| Self::key(id)).collect());
        let removed = self
            .store
            .execute(pipeline)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Store("missing DEL reply".to_string()))?
            .into_integer()?;
        Ok(removed as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn test_store_load_delete() {
        let backend = Arc::new(MemoryStore::new());
        let docs = JsonDocumentStore::new(backend.clone());

        docs.store(&[
            Document::new("doc1").set("name", "foo bar").set("age", 30),
            Document::with_score("doc2", 0.5).set("name", "baz"),
        ])
        .await
        .unwrap();
        assert!(backend.exists("d:doc1"));

        let ids = vec!["doc2".to_string(), "missing".to_string(), "doc1".to_string()];
        let loaded = docs.load(&ids).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id(), "doc2");
        assert_eq!(loaded[0].get_score(), 0.5);
        assert_eq!(loaded[1].id(), "doc1");
        assert_eq!(loaded[1].property("age").unwrap().as_f64(), Some(30.0));

        assert_eq!(docs.delete(&ids).await.unwrap(), 2);
        assert!(docs.load(&ids).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_calls() {
        let docs = JsonDocumentStore::new(Arc::new(MemoryStore::new()));
        docs.store(&[]).await.unwrap();
        assert!(docs.load(&[]).await.unwrap().is_empty());
        assert_eq!(docs.delete(&[]).await.unwrap(), 0);
    }
}
