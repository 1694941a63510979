//! Persistent set of package IDs awaiting (or having failed) extraction.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::db::KeyValueStore;
use crate::types::PackageId;
use crate::Result;

/// Storage key of the pending queue
pub const QUEUE_KEY: &str = "Queue";
/// Storage key of the failed set
pub const FAILED_KEY: &str = "Failed";

/// Ordered, duplicate-free list of package IDs stored under one key
///
/// Ordering and deduplication live here; durability is delegated to the
/// [`KeyValueStore`]. Read-modify-write sequences are serialized by an internal
/// lock so concurrent `add`/`remove` calls never lose an update.
#[derive(Clone)]
pub struct ArchiveQueue {
    store: Arc<dyn KeyValueStore>,
    key: &'static str,
    lock: Arc<Mutex<()>>,
}

impl ArchiveQueue {
    /// Create a queue stored under `key`
    pub fn new(store: Arc<dyn KeyValueStore>, key: &'static str) -> Self {
        Self {
            store,
            key,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Storage key of this queue
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Current package IDs, in insertion order
    pub async fn get(&self) -> Result<Vec<PackageId>> {
        let value = self.store.get_or(self.key, Value::Array(Vec::new())).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Whether the queue holds no IDs
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.get().await?.is_empty())
    }

    /// Replace the whole queue
    pub async fn set(&self, ids: &[PackageId]) -> Result<()> {
        self.store.store(self.key, serde_json::to_value(ids)?).await
    }

    /// Drop the stored queue entirely
    pub async fn delete(&self) -> Result<()> {
        self.store.delete(self.key).await
    }

    /// Append `id` unless it is already queued
    pub async fn add(&self, id: PackageId) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut ids = self.get().await?;
        if ids.contains(&id) {
            return Ok(());
        }
        ids.push(id);
        debug!(queue = self.key, package_id = id.0, "queued package");
        self.set(&ids).await
    }

    /// Remove `id`; removing an absent ID is a no-op
    pub async fn remove(&self, id: PackageId) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut ids = self.get().await?;
        let before = ids.len();
        ids.retain(|queued| *queued != id);
        if ids.len() == before {
            return Ok(());
        }
        debug!(queue = self.key, package_id = id.0, "dequeued package");
        if ids.is_empty() {
            self.delete().await
        } else {
            self.set(&ids).await
        }
    }
}
