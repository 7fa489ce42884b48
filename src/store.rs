//! TTL-bounded key-value storage for room documents.
//!
//! One JSON blob per room code. Every `set` refreshes the expiry, so an
//! active room never dies while writes keep coming; an abandoned one
//! expires on its own regardless of any cleanup job.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::StoreError;

#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Overwrite the document at `key` and reset its expiry.
    async fn set(&self, key: &str, document: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Fetch the document, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Used only to probe for room-code collisions at creation.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
}

struct Entry {
    document: String,
    expires_at: Instant,
}

/// In-process store. Entries are evicted lazily on read and by the
/// background sweeper, so memory stays bounded even for rooms nobody ever
/// reads again.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries, for logging and tests.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn set(&self, key: &str, document: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                document: document.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        // Lazy eviction: an expired entry is indistinguishable from an
        // absent one, and dropping it here frees the slot for reuse.
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.document.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Spawn a background task that periodically drops expired entries.
pub fn spawn_expiry_sweeper(store: MemoryStore, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let dropped = store.sweep().await;
            if dropped > 0 {
                tracing::debug!("Expiry sweeper dropped {} room(s)", dropped);
            }
        }
    });
}
