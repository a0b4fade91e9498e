//! In-process wait entry store
//!
//! Entries live in a map guarded by a std `RwLock`; the work queue is a
//! `VecDeque` of messages with a visibility timeout and a time to live, so a
//! dequeued message that is never deleted comes back after the timeout.

use crate::error::{MatchmakingError, Result};
use crate::store::WaitEntryStore;
use crate::types::{ConnectionId, WaitEntry, WorkItem};
use crate::utils::{current_timestamp, generate_message_id};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Work queue behaviour of the in-memory store
#[derive(Debug, Clone)]
pub struct InMemoryStoreConfig {
    /// How long a dequeued message stays hidden
    pub visibility_timeout: Duration,
    /// How long a message may sit in the queue before it is dropped
    pub message_ttl: Duration,
}

impl Default for InMemoryStoreConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(10),
            message_ttl: Duration::from_secs(6 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone)]
struct QueuedMessage {
    message_id: String,
    entry_id: ConnectionId,
    inserted_at: DateTime<Utc>,
    visible_at: DateTime<Utc>,
    dequeue_count: u32,
}

/// Wait entry store kept entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryWaitEntryStore {
    entries: RwLock<HashMap<ConnectionId, WaitEntry>>,
    queue: Mutex<VecDeque<QueuedMessage>>,
    config: InMemoryStoreConfig,
}

impl InMemoryWaitEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: InMemoryStoreConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            config,
        }
    }

    /// Number of messages in the work queue, hidden ones included
    pub fn queue_len(&self) -> Result<usize> {
        let queue = self
            .queue
            .lock()
            .map_err(|_| MatchmakingError::store("Failed to acquire work queue lock"))?;
        Ok(queue.len())
    }

    fn to_chrono(duration: Duration) -> chrono::Duration {
        chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
    }

    fn enqueue(&self, entry_id: &str, now: DateTime<Utc>) -> Result<()> {
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| MatchmakingError::store("Failed to acquire work queue lock"))?;

        let message_id = generate_message_id();
        debug!("Enqueued work item {} for entry {}", message_id, entry_id);
        queue.push_back(QueuedMessage {
            message_id,
            entry_id: entry_id.to_string(),
            inserted_at: now,
            visible_at: now,
            dequeue_count: 0,
        });
        Ok(())
    }
}

#[async_trait]
impl WaitEntryStore for InMemoryWaitEntryStore {
    async fn create(&self, entry: WaitEntry, enqueue: bool) -> Result<bool> {
        let id = entry.id.clone();
        {
            let mut entries = self
                .entries
                .write()
                .map_err(|_| MatchmakingError::store("Failed to acquire entries lock"))?;

            if entries.contains_key(&id) {
                warn!("Wait entry {} already exists, refusing to overwrite", id);
                return Ok(false);
            }
            entries.insert(id.clone(), entry);
        }

        if enqueue {
            // The entry is stored even if queueing fails, matching a store whose
            // document write and queue write are separate
            if let Err(e) = self.enqueue(&id, current_timestamp()) {
                warn!("Failed to enqueue work item for entry {}: {}", id, e);
            }
        }

        Ok(true)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<WaitEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| MatchmakingError::store("Failed to acquire entries lock"))?;
        Ok(entries.get(id).cloned())
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| MatchmakingError::store("Failed to acquire entries lock"))?;
        Ok(entries.remove(id).is_some())
    }

    async fn delete_many(&self, ids: &[ConnectionId]) -> Result<usize> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| MatchmakingError::store("Failed to acquire entries lock"))?;
        Ok(ids.iter().filter(|id| entries.remove(*id).is_some()).count())
    }

    async fn query(
        &self,
        predicate: &(dyn for<'x> Fn(&'x WaitEntry) -> bool + Send + Sync + '_),
    ) -> Result<Vec<WaitEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| MatchmakingError::store("Failed to acquire entries lock"))?;
        Ok(entries
            .values()
            .filter(|&entry| predicate(entry))
            .cloned()
            .collect())
    }

    async fn approx_population(&self) -> Result<usize> {
        let entries = self
            .entries
            .read()
            .map_err(|_| MatchmakingError::store("Failed to acquire entries lock"))?;
        Ok(entries.len())
    }

    async fn dequeue_work(&self) -> Result<Option<WorkItem>> {
        let now = current_timestamp();
        let ttl = Self::to_chrono(self.config.message_ttl);
        let visibility = Self::to_chrono(self.config.visibility_timeout);

        let mut queue = self
            .queue
            .lock()
            .map_err(|_| MatchmakingError::store("Failed to acquire work queue lock"))?;

        let before = queue.len();
        queue.retain(|message| message.inserted_at + ttl > now);
        if queue.len() < before {
            debug!("Dropped {} expired work items", before - queue.len());
        }

        let Some(message) = queue.iter_mut().find(|message| message.visible_at <= now) else {
            return Ok(None);
        };

        message.visible_at = now + visibility;
        message.dequeue_count += 1;

        Ok(Some(WorkItem {
            message_id: message.message_id.clone(),
            entry_id: message.entry_id.clone(),
            dequeue_count: message.dequeue_count,
            inserted_at: message.inserted_at,
        }))
    }

    async fn delete_work(&self, item: &WorkItem) -> Result<bool> {
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| MatchmakingError::store("Failed to acquire work queue lock"))?;

        match queue
            .iter()
            .position(|message| message.message_id == item.message_id)
        {
            Some(index) => {
                queue.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Activity, Language, Party, Platform};
    use futures::future::join_all;
    use std::sync::Arc;

    fn entry(id: &str) -> WaitEntry {
        WaitEntry::new(
            id,
            Party {
                language: Language::English,
                platform: Platform::PS4,
                activity: Activity::DailyStory,
                party_size: 1,
                username: "Guardian".to_string(),
                level: 22,
            },
            current_timestamp(),
        )
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let store = InMemoryWaitEntryStore::new();
        assert!(store.create(entry("a"), true).await.unwrap());
        assert!(!store.create(entry("a"), true).await.unwrap());

        assert_eq!(store.get_by_id("a").await.unwrap().unwrap().id, "a");
        assert!(store.get_by_id("b").await.unwrap().is_none());
        assert_eq!(store.approx_population().await.unwrap(), 1);
        assert_eq!(store.queue_len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_without_enqueue() {
        let store = InMemoryWaitEntryStore::new();
        assert!(store.create(entry("a"), false).await.unwrap());
        assert_eq!(store.queue_len().unwrap(), 0);
        assert!(store.dequeue_work().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_id_reports_absence() {
        let store = InMemoryWaitEntryStore::new();
        store.create(entry("a"), false).await.unwrap();

        assert!(store.delete_by_id("a").await.unwrap());
        assert!(!store.delete_by_id("a").await.unwrap());
        assert!(!store.delete_by_id("never-existed").await.unwrap());
    }

    #[tokio::test]
    async fn test_racing_claims_have_single_winner() {
        let store = Arc::new(InMemoryWaitEntryStore::new());
        store.create(entry("contested"), false).await.unwrap();

        let claims = (0..16).map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.delete_by_id("contested").await.unwrap() })
        });
        let results = join_all(claims).await;

        let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_query_filters_snapshot() {
        let store = InMemoryWaitEntryStore::new();
        store.create(entry("a"), false).await.unwrap();
        let mut other = entry("b");
        other.party.platform = Platform::XboxOne;
        store.create(other, false).await.unwrap();

        let found = store
            .query(&|e: &WaitEntry| e.party.platform == Platform::PS4)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");
    }

    #[tokio::test]
    async fn test_delete_many() {
        let store = InMemoryWaitEntryStore::new();
        store.create(entry("a"), false).await.unwrap();
        store.create(entry("b"), false).await.unwrap();

        let deleted = store
            .delete_many(&["a".to_string(), "missing".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.approx_population().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dequeued_message_is_hidden_until_timeout() {
        let store = InMemoryWaitEntryStore::with_config(InMemoryStoreConfig {
            visibility_timeout: Duration::from_millis(50),
            message_ttl: Duration::from_secs(60),
        });
        store.create(entry("a"), true).await.unwrap();

        let first = store.dequeue_work().await.unwrap().unwrap();
        assert_eq!(first.entry_id, "a");
        assert_eq!(first.dequeue_count, 1);
        assert!(store.dequeue_work().await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(80)).await;

        let again = store.dequeue_work().await.unwrap().unwrap();
        assert_eq!(again.message_id, first.message_id);
        assert_eq!(again.dequeue_count, 2);

        assert!(store.delete_work(&again).await.unwrap());
        assert!(!store.delete_work(&again).await.unwrap());
        assert_eq!(store.queue_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_messages_are_dropped() {
        let store = InMemoryWaitEntryStore::with_config(InMemoryStoreConfig {
            visibility_timeout: Duration::from_secs(10),
            message_ttl: Duration::from_millis(20),
        });
        store.create(entry("a"), true).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.dequeue_work().await.unwrap().is_none());
        assert_eq!(store.queue_len().unwrap(), 0);
        // The entry itself stays in the pool
        assert!(store.get_by_id("a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let store = InMemoryWaitEntryStore::new();
        store.create(entry("first"), true).await.unwrap();
        store.create(entry("second"), true).await.unwrap();

        assert_eq!(store.dequeue_work().await.unwrap().unwrap().entry_id, "first");
        assert_eq!(store.dequeue_work().await.unwrap().unwrap().entry_id, "second");
    }
}
