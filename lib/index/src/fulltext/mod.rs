//! Faceted full-text index
//!
//! Each facet of a document is one sorted set: a token (`f:`), a numeric
//! field (`k:`) or a coarse geohash cell (`g:`). Queries are answered by
//! combining those sets server side, see [`plan`].

pub mod plan;

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use zindex_core::{geohash, Document, Entry, Error, FieldKind, Query, Result, Spec, TokenSet, Tokenizer};
use zindex_storage::{Pipeline, SortedSetStore};
use crate::config::IndexConfig;
use crate::registry::Registry;
use crate::shard::ShardIndex;
pub use plan::{PlanContext, Step};

/// Bits of the fine geohash stored as the score of a geo facet
const GEO_SCORE_BITS: u32 = 53;

pub struct FullTextFacetedIndex {
    spec: Spec,
    store: Arc<dyn SortedSetStore>,
    tokenizer: Arc<dyn Tokenizer>,
    ctx: PlanContext,
    registry: Registry,
}

impl FullTextFacetedIndex {
    pub fn new(
        name: &str,
        spec: Spec,
        store: Arc<dyn SortedSetStore>,
        tokenizer: Arc<dyn Tokenizer>,
        config: &IndexConfig,
    ) -> Result<Self> {
        if let Some(f) = spec
            .fields()
            .iter()
            .find(|f| matches!(f.kind, FieldKind::Prefix { .. }))
        {
            return Err(Error::Configuration(format!(
                "prefix field '{}' cannot be part of a full-text index",
                f.name
            )));
        }

        Ok(Self {
            spec,
            store,
            tokenizer,
            ctx: PlanContext {
                name: name.to_string(),
                ttl_secs: config.temp_key_ttl_secs,
                total_docs: config.total_docs_estimate,
            },
            registry: Registry::new(name),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.ctx.name
    }

    #[inline]
    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    /// Facet keys and scores a document is written under
    pub fn facets(&self, doc: &Document) -> Result<Vec<(String, f64)>> {
        if doc.id().is_empty() {
            return Err(Error::encoding("id", "document id is empty"));
        }

        let mut facets = Vec::new();
        for field in self.spec.fields() {
            match &field.kind {
                FieldKind::FullText { weights } => {
                    let mut tokens = TokenSet::new();
                    for (source, weight) in weights {
                        if let Some(text) = doc.property(source).and_then(|v| v.as_str()) {
                            tokens.add_all(&self.tokenizer.tokenize(text), *weight);
                        }
                    }
                    if tokens.is_empty() {
                        continue;
                    }
                    tokens.normalize();
                    for token in tokens.iter() {
                        facets.push((
                            self.ctx.token_key(&token.text),
                            doc.get_score() * (0.5 + 0.5 * token.frequency),
                        ));
                    }
                }
                FieldKind::Numeric => {
                    let Some(value) = doc.property(&field.name) else {
                        continue;
                    };
                    let n = value.as_f64().ok_or_else(|| {
                        Error::encoding(&field.name, format!("expected number, got {}", value.type_name()))
                    })?;
                    facets.push((self.ctx.numeric_key(&field.name), n));
                }
                FieldKind::Geo { precision } => {
                    let Some(value) = doc.property(&field.name) else {
                        continue;
                    };
                    let p = value.as_geo().ok_or_else(|| {
                        Error::encoding(&field.name, format!("expected geo, got {}", value.type_name()))
                    })?;
                    let cell = geohash::encode(p.lat, p.lon, *precision)
                        .map_err(|e| Error::encoding(&field.name, e.to_string()))?;
                    let fine = geohash::encode_bits(p.lat, p.lon, GEO_SCORE_BITS)
                        .map_err(|e| Error::encoding(&field.name, e.to_string()))?;
                    facets.push((self.ctx.geo_key(&cell), fine as f64));
                }
                FieldKind::Prefix { .. } => {}
            }
        }
        Ok(facets)
    }
}

#[async_trait]
impl ShardIndex for FullTextFacetedIndex {
    fn id(&self) -> &str {
        &self.ctx.name
    }

    async fn index(&self, docs: Vec<Document>) -> Result<usize> {
        let mut pipeline = Pipeline::new();
        let mut indexed = 0;

        for doc in &docs {
            let facets = match self.facets(doc) {
                Ok(facets) => facets,
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping document '{}' in index '{}': {}", doc.id(), self.ctx.name, e);
                    continue;
                }
            };
            let mut keys = Vec::with_capacity(facets.len());
            for (key, score) in facets {
                pipeline.zadd(key.as_str(), score, doc.id().as_bytes().to_vec());
                keys.push(key.into_bytes());
            }
            self.registry.record(&mut pipeline, doc.id(), keys);
            indexed += 1;
        }

        if pipeline.is_empty() {
            return Ok(0);
        }
        tracing::debug!("Indexing {} documents into '{}' ({} commands)", indexed, self.ctx.name, pipeline.len());
        self.store.execute(pipeline).await?;
        Ok(indexed)
    }

    async fn get(&self, query: &Query) -> Result<Vec<Entry>> {
        let root = plan::plan(&self.spec, self.tokenizer.as_ref(), query)?;
        if query.sort.limit == 0 || root.matches_nothing() {
            return Ok(Vec::new());
        }

        let mut pipeline = Pipeline::new();
        let key = root.evaluate(&self.ctx, &mut pipeline);
        let start = query.sort.start() as isize;
        let stop = (query.sort.end() - 1) as isize;
        let pos = pipeline.zrevrange_withscores(key.as_str(), start, stop);
        tracing::debug!("Query on '{}' reads {} ({} commands): {:?}", self.ctx.name, key, pipeline.len(), root);

        let scored = self
            .store
            .execute(pipeline)
            .await?
            .into_iter()
            .nth(pos)
            .ok_or_else(|| Error::Store("missing ZREVRANGE reply".to_string()))?
            .into_scored()?;

        scored
            .into_iter()
            .map(|(member, score)| {
                String::from_utf8(member)
                    .map(|id| Entry::new(id, score))
                    .map_err(|e| Error::CorruptEntry(format!("id is not utf-8: {}", e)))
            })
            .collect()
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let facets = self.registry.reverse_members(&self.store, ids).await?;

        let mut pipeline = Pipeline::new();
        for (id, keys) in ids.iter().zip(facets) {
            for key in keys {
                let key = String::from_utf8(key).map_err(|e| Error::CorruptEntry(e.to_string()))?;
                pipeline.zrem(key, vec![id.as_bytes().to_vec()]);
            }
        }
        let pos = self.registry.forget(&mut pipeline, ids);
        let removed = self
            .store
            .execute(pipeline)
            .await?
            .into_iter()
            .nth(pos)
            .ok_or_else(|| Error::Store("missing ZREM reply".to_string()))?
            .into_integer()?;
        Ok(removed as usize)
    }

    async fn drop_index(&self) -> Result<bool> {
        let ids = self.registry.all_ids(&self.store).await?;
        let facets = self.registry.reverse_members(&self.store, &ids).await?;

        let mut keys: BTreeSet<String> = BTreeSet::new();
        for key in facets.into_iter().flatten() {
            keys.insert(String::from_utf8(key).map_err(|e| Error::CorruptEntry(e.to_string()))?);
        }
        keys.extend(ids.iter().map(|id| self.registry.reverse_key(id)));
        keys.insert(self.registry.ids_key());

        let mut pipeline = Pipeline::new();
        pipeline.del(keys.into_iter().collect());
        let removed = self
            .store
            .execute(pipeline)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Store("missing DEL reply".to_string()))?
            .into_integer()?;
        tracing::debug!("Dropped index '{}' ({} keys)", self.ctx.name, removed);
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zindex_core::{Field, WordTokenizer};
    use zindex_storage::MemoryStore;

    fn index() -> (FullTextFacetedIndex, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let spec = Spec::new(vec![
            Field::fulltext("body", ["title"]),
            Field::numeric("price"),
            Field::geo("loc", 5),
        ])
        .unwrap();
        let idx = FullTextFacetedIndex::new(
            "idx",
            spec,
            store.clone(),
            Arc::new(WordTokenizer::default()),
            &IndexConfig::default(),
        )
        .unwrap();
        (idx, store)
    }

    fn docs() -> Vec<Document> {
        vec![
            Document::with_score("doc1", 1.0)
                .set("title", "hello world")
                .set("price", 10)
                .set("loc", (32.0667, 34.8000)),
            Document::with_score("doc2", 2.0)
                .set("title", "hello werld")
                .set("price", 20)
                .set("loc", (32.0677, 34.8010)),
            Document::with_score("doc3", 3.0)
                .set("title", "jello world")
                .set("price", 30.0)
                .set("loc", (-32.0667, -34.8000)),
        ]
    }

    async fn loaded() -> (FullTextFacetedIndex, Arc<MemoryStore>) {
        let (idx, store) = index();
        assert_eq!(idx.index(docs()).await.unwrap(), 3);
        (idx, store)
    }

    fn ids(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_prefix_field_rejected() {
        let spec = Spec::new(vec![Field::prefix("name", false)]).unwrap();
        let result = FullTextFacetedIndex::new(
            "idx",
            spec,
            Arc::new(MemoryStore::new()),
            Arc::new(WordTokenizer::default()),
            &IndexConfig::default(),
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_facets() {
        let (idx, _) = index();
        let facets = idx.facets(&docs()[0]).unwrap();
        assert_eq!(facets.len(), 4);
        assert_eq!(facets[0], ("f:idx:hello".to_string(), 0.75));
        assert_eq!(facets[1], ("f:idx:world".to_string(), 0.75));
        assert_eq!(facets[2], ("k:idx:price".to_string(), 10.0));
        assert_eq!(facets[3].0, "g:idx:sv8wr");

        // absent properties are skipped, mistyped ones reject the document
        assert_eq!(idx.facets(&Document::new("x").set("title", "hi world")).unwrap().len(), 2);
        assert!(matches!(
            idx.facets(&Document::new("x").set("price", "cheap")),
            Err(Error::Encoding { .. })
        ));
    }

    #[tokio::test]
    async fn test_single_token() {
        let (idx, _) = loaded().await;
        let found = idx.get(&Query::new("idx").filter_matches("title", "hello")).await.unwrap();
        assert_eq!(ids(&found), vec!["doc2", "doc1"]);
        assert_eq!(found[0].score, 1.5);
        assert_eq!(found[1].score, 0.75);
    }

    #[tokio::test]
    async fn test_token_intersection() {
        let (idx, store) = loaded().await;
        let found = idx.get(&Query::new("idx").filter_matches("body", "Hello, World")).await.unwrap();
        assert_eq!(ids(&found), vec!["doc1"]);
        assert!(found[0].score > 0.0);

        let temps = store.keys_with_prefix("tmp:idx:text:");
        assert_eq!(temps.len(), 1);
        assert!(store.ttl(&temps[0]).is_some());
    }

    #[tokio::test]
    async fn test_between_with_text() {
        let (idx, _) = loaded().await;
        let q = Query::new("idx").filter_matches("title", "world").filter_between("price", 15, 35);
        let found = idx.get(&q).await.unwrap();
        assert_eq!(ids(&found), vec!["doc3"]);
        // ranges only filter
        assert_eq!(found[0].score, 2.25);
    }

    #[tokio::test]
    async fn test_numeric_only() {
        let (idx, _) = loaded().await;
        let found = idx.get(&Query::new("idx").filter_greater_equal("price", 20)).await.unwrap();
        assert_eq!(ids(&found), vec!["doc3", "doc2"]);
        let found = idx.get(&Query::new("idx").filter_greater_than("price", 20)).await.unwrap();
        assert_eq!(ids(&found), vec!["doc3"]);
        let found = idx.get(&Query::new("idx").filter_less_than("price", 20)).await.unwrap();
        assert_eq!(ids(&found), vec!["doc1"]);
        let found = idx.get(&Query::new("idx").filter_equals("price", 30)).await.unwrap();
        assert_eq!(ids(&found), vec!["doc3"]);

        let found = idx.get(&Query::new("idx").filter_in("price", [10, 30, 40])).await.unwrap();
        let mut found = ids(&found);
        found.sort_unstable();
        assert_eq!(found, vec!["doc1", "doc3"]);
    }

    #[tokio::test]
    async fn test_radius_with_text() {
        let (idx, _) = loaded().await;
        let found = idx
            .get(&Query::new("idx").filter_radius("loc", 32.0667, 34.8, 1000.0))
            .await
            .unwrap();
        let mut near = ids(&found);
        near.sort_unstable();
        assert_eq!(near, vec!["doc1", "doc2"]);

        let q = Query::new("idx")
            .filter_matches("title", "world")
            .filter_radius("loc", 32.0667, 34.8, 1000.0);
        let found = idx.get(&q).await.unwrap();
        assert_eq!(ids(&found), vec!["doc1"]);
        assert_eq!(found[0].score, 0.75);
    }

    #[tokio::test]
    async fn test_empty_results() {
        let (idx, store) = loaded().await;
        let before = store.key_count();

        let found = idx.get(&Query::new("idx").filter_matches("title", "the of and")).await.unwrap();
        assert!(found.is_empty());
        assert_eq!(store.key_count(), before);

        let found = idx.get(&Query::new("idx").filter_matches("title", "hello").limit(0, 0)).await.unwrap();
        assert!(found.is_empty());
        let found = idx.get(&Query::new("idx").filter_matches("title", "nothing")).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_paging() {
        let (idx, _) = loaded().await;
        let found = idx.get(&Query::new("idx").filter_matches("title", "world").limit(1, 5)).await.unwrap();
        assert_eq!(ids(&found), vec!["doc1"]);
    }

    #[tokio::test]
    async fn test_unbounded_limit_keeps_last_entry() {
        let (idx, _) = loaded().await;
        let q = Query::new("idx").filter_matches("title", "hello").limit(0, usize::MAX);
        assert_eq!(ids(&idx.get(&q).await.unwrap()), vec!["doc2", "doc1"]);
        let q = Query::new("idx").filter_matches("title", "hello").limit(1, usize::MAX);
        assert_eq!(ids(&idx.get(&q).await.unwrap()), vec!["doc1"]);
    }

    #[tokio::test]
    async fn test_repeated_query_reuses_temporaries() {
        let (idx, store) = loaded().await;
        let q = Query::new("idx").filter_matches("title", "world").filter_less_equal("price", 30);
        let first = idx.get(&q).await.unwrap();
        let keys = store.key_count();
        let second = idx.get(&q).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.key_count(), keys);
    }

    #[tokio::test]
    async fn test_errors() {
        let (idx, _) = loaded().await;
        assert!(matches!(
            idx.get(&Query::new("idx").filter_prefix("title", "hel")).await,
            Err(Error::UnsupportedFilter(_))
        ));
        assert!(matches!(
            idx.get(&Query::new("idx").filter_equals("color", "red")).await,
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_skips_bad_documents() {
        let (idx, _) = index();
        let count = idx
            .index(vec![
                Document::new("good").set("title", "useful"),
                Document::new("bad").set("title", "useful").set("loc", "not a point"),
            ])
            .await
            .unwrap();
        assert_eq!(count, 1);
        let found = idx.get(&Query::new("idx").filter_matches("title", "useful")).await.unwrap();
        assert_eq!(ids(&found), vec!["good"]);
    }

    #[tokio::test]
    async fn test_delete_and_drop() {
        let (idx, store) = loaded().await;

        assert_eq!(idx.delete(&["doc1".to_string(), "ghost".to_string()]).await.unwrap(), 1);
        let found = idx.get(&Query::new("idx").filter_matches("title", "hello")).await.unwrap();
        assert_eq!(ids(&found), vec!["doc2"]);
        assert!(!store.exists("r:idx:doc1"));
        assert_eq!(idx.delete(&["doc1".to_string()]).await.unwrap(), 0);

        assert!(idx.drop_index().await.unwrap());
        assert_eq!(store.key_count(), 0);
        assert!(!idx.drop_index().await.unwrap());
    }
}
