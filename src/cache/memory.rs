//! In-process LRU backend with per-entry expiry.
//!
//! Uses the tokio clock so expiry can be driven by paused time in tests.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;

use super::lock::rw_write;
use super::store::{CacheStore, StoreError};

const LOCK_TARGET: &str = "cache::memory";
const METRIC_MEMORY_EVICT_TOTAL: &str = "storefront_cache_memory_evict_total";

struct Entry {
    value: Bytes,
    expires_at: Instant,
}

pub struct MemoryStore {
    entries: RwLock<LruCache<String, Entry>>,
    prefix_scan: bool,
}

impl MemoryStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            prefix_scan: true,
        }
    }

    /// Behaves like a backend that cannot enumerate its keys.
    pub fn without_prefix_scan(mut self) -> Self {
        self.prefix_scan = false;
        self
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        rw_write(&self.entries, LOCK_TARGET, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn supports_prefix_scan(&self) -> bool {
        self.prefix_scan
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, LOCK_TARGET, "get");
        let expired = match entries.get(key) {
            Some(entry) if now < entry.expires_at => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        if ttl.is_zero() {
            return Ok(());
        }
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let evicted = rw_write(&self.entries, LOCK_TARGET, "set").push(key.to_string(), entry);
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!(METRIC_MEMORY_EVICT_TOTAL).increment(1);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(rw_write(&self.entries, LOCK_TARGET, "delete")
            .pop(key)
            .is_some())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        if !self.prefix_scan {
            return Err(StoreError::Unsupported {
                op: "delete_by_prefix",
            });
        }

        let mut entries = rw_write(&self.entries, LOCK_TARGET, "delete_by_prefix");
        let matching: Vec<String> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &matching {
            entries.pop(key);
        }
        Ok(matching.len() as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) {
        rw_write(&self.entries, LOCK_TARGET, "close").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(capacity: usize) -> MemoryStore {
        MemoryStore::new(NonZeroUsize::new(capacity).expect("non-zero"))
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_exactly_at_ttl() {
        let store = store(8);
        let ttl = Duration::from_secs(120);
        store
            .set("k", Bytes::from_static(b"v"), ttl)
            .await
            .expect("set");

        tokio::time::advance(ttl - Duration::from_millis(1)).await;
        assert_eq!(
            store.get("k").await.expect("get"),
            Some(Bytes::from_static(b"v"))
        );

        tokio::time::advance(Duration::from_millis(2)).await;
        assert_eq!(store.get("k").await.expect("get"), None);
        assert!(store.is_empty(), "expired entry should be dropped on read");
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let store = store(2);
        let ttl = Duration::from_secs(60);
        store.set("a", Bytes::from_static(b"1"), ttl).await.expect("set");
        store.set("b", Bytes::from_static(b"2"), ttl).await.expect("set");
        store.get("a").await.expect("get");
        store.set("c", Bytes::from_static(b"3"), ttl).await.expect("set");

        assert!(store.get("a").await.expect("get").is_some());
        assert!(store.get("b").await.expect("get").is_none());
        assert!(store.get("c").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn prefix_delete_only_touches_matching_keys() {
        let store = store(8);
        let ttl = Duration::from_secs(60);
        for key in [
            "sf:pub:product:slug=a:loc=-",
            "sf:pub:product:slug=a:loc=en",
            "sf:pub:products:f=1",
        ] {
            store.set(key, Bytes::from_static(b"x"), ttl).await.expect("set");
        }

        let removed = store
            .delete_by_prefix("sf:pub:product:")
            .await
            .expect("prefix delete");
        assert_eq!(removed, 2);
        assert!(store.get("sf:pub:products:f=1").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn zero_ttl_is_not_stored() {
        let store = store(8);
        store
            .set("k", Bytes::from_static(b"v"), Duration::ZERO)
            .await
            .expect("set");
        assert!(store.is_empty());
    }
}
