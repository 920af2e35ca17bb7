//! Hash-partitioned index
//!
//! Documents are routed to one of N sub-indexes by `crc32(id) mod N`.
//! Reads scatter to every partition under a deadline and gather the best
//! entries through a bounded min-heap.

use async_trait::async_trait;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use zindex_core::{Document, Entry, Error, Query, Result, Spec};
use zindex_storage::SortedSetStore;
use crate::config::{IndexConfig, PartitionConfig};
use crate::shard::{IndexFactory, ShardIndex};

/// Partition an id belongs to among `n`
#[inline]
pub fn partition_for(id: &str, n: usize) -> usize {
    crc32fast::hash(id.as_bytes()) as usize % n
}

/// Name of the sub-index holding partition `i`
#[inline]
pub fn partition_name(name: &str, i: usize) -> String {
    format!("{}{{{}}}", name, i)
}

/// Merged entries of a scatter-gather read and the partitions that did not
/// contribute
#[derive(Debug, Clone, Default)]
pub struct PartitionedResult {
    pub entries: Vec<Entry>,
    pub timed_out: Vec<usize>,
    pub failed: Vec<usize>,
}

impl PartitionedResult {
    #[inline]
    pub fn is_partial(&self) -> bool {
        !self.timed_out.is_empty() || !self.failed.is_empty()
    }
}

const PREALLOCATED: usize = 1024;

/// Keeps the `capacity` highest-scored entries seen
struct TopEntries {
    heap: BinaryHeap<(Reverse<OrderedFloat<f64>>, String)>,
    capacity: usize,
}

impl TopEntries {
    fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity.min(PREALLOCATED) + 1),
            capacity,
        }
    }

    fn push(&mut self, entry: Entry) {
        self.heap.push((Reverse(OrderedFloat(entry.score)), entry.id));
        if self.heap.len() > self.capacity {
            self.heap.pop();
        }
    }

    /// Highest score first
    fn into_sorted(self) -> Vec<Entry> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|(Reverse(score), id)| Entry::new(id, score.into_inner()))
            .collect()
    }
}

pub struct PartitionedIndex {
    name: String,
    partitions: Vec<Arc<dyn ShardIndex>>,
    config: PartitionConfig,
}

impl PartitionedIndex {
    /// Build `config.num_partitions` sub-indexes, placing partition `i` on
    /// store `i mod stores.len()`
    pub fn new(
        name: &str,
        spec: &Spec,
        factory: &dyn IndexFactory,
        stores: &[Arc<dyn SortedSetStore>],
        index_config: &IndexConfig,
        config: PartitionConfig,
    ) -> Result<Self> {
        if stores.is_empty() {
            return Err(Error::Configuration(format!(
                "partitioned index '{}' needs at least one store",
                name
            )));
        }

        let partitions = (0..config.num_partitions)
            .map(|i| {
                let store = stores[i % stores.len()].clone();
                factory.create(&partition_name(name, i), spec, store, index_config)
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_partitions(name, partitions, config)
    }

    /// Wrap already built sub-indexes; their order fixes the routing
    pub fn from_partitions(
        name: &str,
        partitions: Vec<Arc<dyn ShardIndex>>,
        mut config: PartitionConfig,
    ) -> Result<Self> {
        if partitions.is_empty() {
            return Err(Error::Configuration(format!(
                "partitioned index '{}' needs at least one partition",
                name
            )));
        }
        config.num_partitions = partitions.len();

        Ok(Self {
            name: name.to_string(),
            partitions,
            config,
        })
    }

    #[inline]
    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    #[inline]
    pub fn partition(&self, id: &str) -> usize {
        partition_for(id, self.partitions.len())
    }

    #[inline]
    pub fn partitions(&self) -> &[Arc<dyn ShardIndex>] {
        &self.partitions
    }

    /// Scatter `query` to every partition and merge whatever answers before
    /// the deadline
    pub async fn search(&self, query: &Query) -> Result<PartitionedResult> {
        let (offset, limit) = (query.sort.offset, query.sort.limit);
        if limit == 0 {
            return Ok(PartitionedResult::default());
        }

        let head = Arc::new(query.head());
        let permits = Arc::new(Semaphore::new(self.config.effective_concurrency()));
        let mut tasks = JoinSet::new();
        for (i, shard) in self.partitions.iter().enumerate() {
            let shard = shard.clone();
            let head = head.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => shard.get(&head).await,
                    Err(e) => Err(Error::Store(e.to_string())),
                };
                (i, result)
            });
        }

        let deadline = tokio::time::Instant::now() + self.config.timeout();
        let mut pending: BTreeSet<usize> = (0..self.partitions.len()).collect();
        let mut failed = Vec::new();
        let mut top = TopEntries::new(head.sort.limit);
        let mut expired = false;

        loop {
            let next = tokio::time::timeout_at(deadline, tasks.join_next()).await;
            match next {
                Ok(Some(Ok((i, result)))) => {
                    pending.remove(&i);
                    match result {
                        Ok(entries) => entries.into_iter().for_each(|e| top.push(e)),
                        Err(e) => {
                            tracing::warn!("Partition {} of '{}' failed: {}", i, self.name, e);
                            failed.push(i);
                        }
                    }
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!("Partition task of '{}' did not complete: {}", self.name, e);
                }
                Ok(None) => break,
                Err(_) => {
                    tasks.abort_all();
                    expired = true;
                    break;
                }
            }
        }

        // without a deadline hit, anything still pending died in its task
        let (timed_out, panicked): (Vec<usize>, Vec<usize>) = if expired {
            (pending.into_iter().collect(), Vec::new())
        } else {
            (Vec::new(), pending.into_iter().collect())
        };
        failed.extend(panicked);
        failed.sort_unstable();

        if timed_out.len() + failed.len() == self.partitions.len() {
            let mut partitions: Vec<usize> = timed_out.into_iter().chain(failed).collect();
            partitions.sort_unstable();
            return Err(Error::PartitionTimeout { partitions });
        }

        let entries = top.into_sorted().into_iter().skip(offset).take(limit).collect();
        Ok(PartitionedResult {
            entries,
            timed_out,
            failed,
        })
    }
}

#[async_trait]
impl ShardIndex for PartitionedIndex {
    fn id(&self) -> &str {
        &self.name
    }

    async fn index(&self, docs: Vec<Document>) -> Result<usize> {
        let n = self.partitions.len();
        let mut groups: Vec<Vec<Document>> = (0..n).map(|_| Vec::new()).collect();
        for doc in docs {
            groups[partition_for(doc.id(), n)].push(doc);
        }

        let mut tasks = JoinSet::new();
        for (i, group) in groups.into_iter().enumerate() {
            if group.is_empty() {
                continue;
            }
            let shard = self.partitions[i].clone();
            tasks.spawn(async move { (i, shard.index(group).await) });
        }

        let mut indexed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(count))) => indexed += count,
                Ok((i, Err(e))) => {
                    tracing::warn!("Indexing into partition {} of '{}' failed: {}", i, self.name, e);
                }
                Err(e) => {
                    tracing::warn!("Indexing task of '{}' did not complete: {}", self.name, e);
                }
            }
        }
        Ok(indexed)
    }

    async fn get(&self, query: &Query) -> Result<Vec<Entry>> {
        let result = self.search(query).await?;
        if result.is_partial() {
            tracing::warn!(
                "Partial result from '{}': timed out {:?}, failed {:?}",
                self.name,
                result.timed_out,
                result.failed
            );
        }
        Ok(result.entries)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let n = self.partitions.len();
        let mut groups: Vec<Vec<String>> = (0..n).map(|_| Vec::new()).collect();
        for id in ids {
            groups[partition_for(id, n)].push(id.clone());
        }

        let mut tasks = JoinSet::new();
        for (i, group) in groups.into_iter().enumerate() {
            if group.is_empty() {
                continue;
            }
            let shard = self.partitions[i].clone();
            tasks.spawn(async move { (i, shard.delete(&group).await) });
        }

        let mut removed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(count))) => removed += count,
                Ok((i, Err(e))) => {
                    tracing::warn!("Deleting from partition {} of '{}' failed: {}", i, self.name, e);
                }
                Err(e) => {
                    tracing::warn!("Delete task of '{}' did not complete: {}", self.name, e);
                }
            }
        }
        Ok(removed)
    }

    async fn drop_index(&self) -> Result<bool> {
        let mut tasks = JoinSet::new();
        for (i, shard) in self.partitions.iter().enumerate() {
            let shard = shard.clone();
            tasks.spawn(async move { (i, shard.drop_index().await) });
        }

        let mut any = false;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(dropped))) => any |= dropped,
                Ok((i, Err(e))) => {
                    tracing::warn!("Dropping partition {} of '{}' failed: {}", i, self.name, e);
                }
                Err(e) => {
                    tracing::warn!("Drop task of '{}' did not complete: {}", self.name, e);
                }
            }
        }
        Ok(any)
    }
}
