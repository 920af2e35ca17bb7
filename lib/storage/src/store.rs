use async_trait::async_trait;
use zindex_core::Result;
use crate::command::{Pipeline, Reply};

/// A remote (or in-process) sorted-set key/value store.
///
/// Implementations must apply the commands of one pipeline in submission
/// order and return one reply per command. They are shared between tasks.
#[async_trait]
pub trait SortedSetStore: Send + Sync {
    async fn execute(&self, pipeline: Pipeline) -> Result<Vec<Reply>>;

    /// Backend name for logs
    fn kind(&self) -> &'static str;
}
