//! Written-key registry.
//!
//! Records every key this process wrote so that prefix purges still work
//! against backends that cannot enumerate their keyspace. Only populated when
//! the active store reports no prefix-scan support.
//!
//! Each key carries the deadline of its store entry. Entries past their
//! deadline are dropped whenever the registry runs full, so the registry
//! tracks live entries rather than every key ever written.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::lock::{rw_read, rw_write};

const LOCK_TARGET: &str = "cache::registry";

/// Ordered map of written keys to their expiry, queried by prefix range.
pub struct CacheRegistry {
    keys: RwLock<BTreeMap<String, Instant>>,
    capacity: usize,
}

impl CacheRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            keys: RwLock::new(BTreeMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Reserve a key that is about to be written with `ttl`.
    ///
    /// Returns false when the registry is full of live keys; the caller must
    /// then skip the write, since a purge could never find the entry.
    pub fn record(&self, key: &str, ttl: Duration) -> bool {
        let expires_at = Instant::now() + ttl;
        let mut keys = rw_write(&self.keys, LOCK_TARGET, "record");
        if let Some(deadline) = keys.get_mut(key) {
            *deadline = (*deadline).max(expires_at);
            return true;
        }
        if keys.len() >= self.capacity {
            let pruned = prune(&mut keys);
            if pruned > 0 {
                debug!(pruned, "Expired keys dropped from cache key registry");
            }
        }
        if keys.len() >= self.capacity {
            warn!(
                key,
                capacity = self.capacity,
                hint = "raise cache.memory_capacity or use a backend with prefix scan",
                "Cache key registry full; response will not be cached"
            );
            return false;
        }
        keys.insert(key.to_string(), expires_at);
        true
    }

    /// All recorded keys starting with `prefix`.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        rw_read(&self.keys, LOCK_TARGET, "keys_with_prefix")
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn forget(&self, key: &str) {
        rw_write(&self.keys, LOCK_TARGET, "forget").remove(key);
    }

    /// Drops every recorded key under `prefix`, returning how many were known.
    pub fn forget_prefix(&self, prefix: &str) -> usize {
        let mut keys = rw_write(&self.keys, LOCK_TARGET, "forget_prefix");
        let matching: Vec<String> = keys
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in &matching {
            keys.remove(key);
        }
        matching.len()
    }

    /// Drops keys whose store entry has expired, returning how many.
    pub fn prune_expired(&self) -> usize {
        prune(&mut rw_write(&self.keys, LOCK_TARGET, "prune_expired"))
    }

    pub fn clear(&self) {
        rw_write(&self.keys, LOCK_TARGET, "clear").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.keys, LOCK_TARGET, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new(10_000)
    }
}

fn prune(keys: &mut BTreeMap<String, Instant>) -> usize {
    let now = Instant::now();
    let before = keys.len();
    keys.retain(|_, deadline| *deadline > now);
    before - keys.len()
}
