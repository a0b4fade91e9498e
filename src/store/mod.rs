//! Wait entry storage
//!
//! The store holds every party waiting to be matched plus a work queue of entry
//! ids. Deleting an entry by id is the only claim primitive the engine uses: of
//! any number of racing deletes for one id, exactly one reports success.

pub mod memory;
pub mod trimmer;

pub use memory::{InMemoryStoreConfig, InMemoryWaitEntryStore};
pub use trimmer::SchemaTrimmer;

use crate::error::Result;
use crate::types::{ConnectionId, WaitEntry, WorkItem};
use async_trait::async_trait;

/// Document store plus work queue holding waiting parties
#[async_trait]
pub trait WaitEntryStore: Send + Sync {
    /// Insert a new entry, optionally enqueueing a work item naming it.
    /// Returns `false` if the entry could not be created.
    async fn create(&self, entry: WaitEntry, enqueue: bool) -> Result<bool>;

    /// Point lookup by id
    async fn get_by_id(&self, id: &str) -> Result<Option<WaitEntry>>;

    /// Atomically remove an entry. Returns `false` when it is already gone.
    async fn delete_by_id(&self, id: &str) -> Result<bool>;

    /// Remove several entries, returning how many were actually deleted
    async fn delete_many(&self, ids: &[ConnectionId]) -> Result<usize>;

    /// Point-in-time snapshot of the entries matching `predicate`
    async fn query(
        &self,
        predicate: &(dyn for<'x> Fn(&'x WaitEntry) -> bool + Send + Sync + '_),
    ) -> Result<Vec<WaitEntry>>;

    /// Approximate number of waiting entries
    async fn approx_population(&self) -> Result<usize>;

    /// Take the next visible work item, hiding it until it is deleted or its
    /// visibility timeout lapses
    async fn dequeue_work(&self) -> Result<Option<WorkItem>>;

    /// Permanently remove a work item
    async fn delete_work(&self, item: &WorkItem) -> Result<bool>;
}
