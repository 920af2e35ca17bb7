//! Id bookkeeping shared by the single-shard indexes
//!
//! `ids:{index}` holds every indexed id and `r:{index}:{id}` the members
//! written for that id, so deletes and drops never need to scan.

use std::sync::Arc;
use zindex_core::{Error, Result};
use zindex_storage::{Command, Pipeline, SortedSetStore};

#[derive(Debug, Clone)]
pub(crate) struct Registry {
    name: String,
}

impl Registry {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub(crate) fn ids_key(&self) -> String {
        format!("ids:{}", self.name)
    }

    pub(crate) fn reverse_key(&self, id: &str) -> String {
        format!("r:{}:{}", self.name, id)
    }

    /// Queue the records of one indexed document
    pub(crate) fn record(&self, pipeline: &mut Pipeline, id: &str, members: Vec<Vec<u8>>) {
        pipeline.zadd(self.ids_key(), 0.0, id.as_bytes().to_vec());
        if !members.is_empty() {
            pipeline.push(Command::ZAdd {
                key: self.reverse_key(id),
                members: members.into_iter().map(|m| (0.0, m)).collect(),
            });
        }
    }

    /// Reverse members of each id, in request order
    pub(crate) async fn reverse_members(
        &self,
        store: &Arc<dyn SortedSetStore>,
        ids: &[String],
    ) -> Result<Vec<Vec<Vec<u8>>>> {
        let mut pipeline = Pipeline::new();
        for id in ids {
            pipeline.zrange(self.reverse_key(id), 0, -1);
        }
        store
            .execute(pipeline)
            .await?
            .into_iter()
            .map(|r| r.into_members())
            .collect()
    }

    pub(crate) async fn all_ids(&self, store: &Arc<dyn SortedSetStore>) -> Result<Vec<String>> {
        let mut pipeline = Pipeline::new();
        pipeline.zrange(self.ids_key(), 0, -1);
        let members = store
            .execute(pipeline)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Store("missing ZRANGE reply".to_string()))?
            .into_members()?;

        members
            .into_iter()
            .map(|m| String::from_utf8(m).map_err(|e| Error::CorruptEntry(e.to_string())))
            .collect()
    }

    /// Queue removal of the records of `ids`; the reply at the returned
    /// position counts the ids that were registered
    pub(crate) fn forget(&self, pipeline: &mut Pipeline, ids: &[String]) -> usize {
        pipeline.del(ids.iter().map(|id| self.reverse_key(id)).collect());
        pipeline.zrem(self.ids_key(), ids.iter().map(|id| id.as_bytes().to_vec()).collect())
    }
}
