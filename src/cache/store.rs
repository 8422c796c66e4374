//! Cache store abstraction.
//!
//! [`CacheStore`] is the raw backend contract; it reports failures as
//! [`StoreError`]. Application code only ever sees [`GuardedStore`], which
//! bounds every call with a timeout and degrades failures to a logged warning
//! plus a safe default, so the cache can never fail a request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::{CacheBackendKind, CacheConfig};
use super::memory::MemoryStore;
use super::redis::RedisStore;

pub(crate) const METRIC_STORE_ERROR_TOTAL: &str = "storefront_cache_store_error_total";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation `{op}` timed out")]
    Timeout { op: &'static str },
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache operation `{op}` is not supported by this backend")]
    Unsupported { op: &'static str },
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Timeout { .. } => "timeout",
            Self::Backend(_) => "backend",
            Self::Unsupported { .. } => "unsupported",
        }
    }
}

/// Key/value store with per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Whether `delete_by_prefix` can enumerate keys on this backend.
    fn supports_prefix_scan(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError>;

    /// Returns whether an entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Removes every entry whose key starts with `prefix`, returning the count.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn close(&self);
}

/// Pass-through store used when caching is disabled or unreachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

#[async_trait]
impl CacheStore for NoopStore {
    fn backend(&self) -> &'static str {
        "none"
    }

    async fn get(&self, _key: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), StoreError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn delete_by_prefix(&self, _prefix: &str) -> Result<u64, StoreError> {
        Ok(0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) {}
}

/// Outcome of a guarded prefix purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixPurge {
    Deleted(u64),
    /// The backend cannot enumerate; the caller should fall back to known keys.
    Unsupported,
    Failed,
}

/// Timeout-bounded, never-failing view over a [`CacheStore`].
#[derive(Clone)]
pub struct GuardedStore {
    inner: Arc<dyn CacheStore>,
    op_timeout: Duration,
}

impl GuardedStore {
    pub fn new(inner: Arc<dyn CacheStore>, op_timeout: Duration) -> Self {
        Self { inner, op_timeout }
    }

    pub fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    pub fn supports_prefix_scan(&self) -> bool {
        self.inner.supports_prefix_scan()
    }

    async fn guard<T, F>(&self, op: &'static str, key: &str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let result = match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout { op }),
        };

        if let Err(err) = &result {
            if matches!(err, StoreError::Unsupported { .. }) {
                debug!(op, key, backend = self.backend(), "Cache operation unsupported");
            } else {
                counter!(
                    METRIC_STORE_ERROR_TOTAL,
                    "op" => op,
                    "kind" => err.kind()
                )
                .increment(1);
                warn!(
                    op,
                    key,
                    backend = self.backend(),
                    error = %err,
                    result = "degraded",
                    "Cache store operation failed"
                );
            }
        }
        result
    }

    /// Returns `None` on miss and on any backend failure.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.guard("get", key, self.inner.get(key))
            .await
            .ok()
            .flatten()
    }

    /// Returns whether the entry was written.
    pub async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> bool {
        self.guard("set", key, self.inner.set(key, value, ttl))
            .await
            .is_ok()
    }

    /// Returns false only when the backend failed; deleting an absent key succeeds.
    pub async fn delete(&self, key: &str) -> bool {
        self.guard("delete", key, self.inner.delete(key))
            .await
            .is_ok()
    }

    pub async fn delete_by_prefix(&self, prefix: &str) -> PrefixPurge {
        match self
            .guard("delete_by_prefix", prefix, self.inner.delete_by_prefix(prefix))
            .await
        {
            Ok(count) => PrefixPurge::Deleted(count),
            Err(StoreError::Unsupported { .. }) => PrefixPurge::Unsupported,
            Err(_) => PrefixPurge::Failed,
        }
    }

    /// Health probe; unlike the data path this surfaces the error.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.guard("ping", "-", self.inner.ping()).await
    }

    pub async fn close(&self) {
        self.inner.close().await;
        info!(backend = self.backend(), "Cache store closed");
    }
}

/// Builds the configured backend, falling back to [`NoopStore`] when the
/// backend is disabled or cannot be reached within the connect timeout.
pub async fn connect(config: &CacheConfig) -> Arc<dyn CacheStore> {
    if !config.is_enabled() {
        info!(backend = "none", "Response cache disabled");
        return Arc::new(NoopStore);
    }

    match config.backend {
        CacheBackendKind::Memory => {
            let capacity = config.memory_capacity_non_zero();
            info!(backend = "memory", capacity = capacity.get(), "Response cache ready");
            Arc::new(MemoryStore::new(capacity))
        }
        CacheBackendKind::Redis => {
            let Some(url) = config.redis_url.as_deref() else {
                warn!(
                    backend = "redis",
                    hint = "set cache.redis_url",
                    "Redis backend selected without a URL; caching disabled"
                );
                return Arc::new(NoopStore);
            };

            match tokio::time::timeout(config.connect_timeout(), RedisStore::connect(url)).await {
                Ok(Ok(store)) => {
                    info!(backend = "redis", "Response cache ready");
                    Arc::new(store)
                }
                Ok(Err(err)) => {
                    warn!(
                        backend = "redis",
                        error = %err,
                        "Redis unreachable at startup; caching disabled"
                    );
                    Arc::new(NoopStore)
                }
                Err(_) => {
                    warn!(
                        backend = "redis",
                        timeout_ms = config.connect_timeout_ms,
                        "Redis connect timed out; caching disabled"
                    );
                    Arc::new(NoopStore)
                }
            }
        }
        CacheBackendKind::None => Arc::new(NoopStore),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Stores with scripted failures for exercising the degraded paths.

    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// Fails every operation with `Unavailable` while `down` is set.
    pub(crate) struct FlakyStore {
        pub(crate) inner: MemoryStore,
        pub(crate) down: AtomicBool,
    }

    impl FlakyStore {
        pub(crate) fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                down: AtomicBool::new(false),
            }
        }

        pub(crate) fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.down.load(Ordering::SeqCst) {
                Err(StoreError::Unavailable("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CacheStore for FlakyStore {
        fn backend(&self) -> &'static str {
            "flaky"
        }

        fn supports_prefix_scan(&self) -> bool {
            self.inner.supports_prefix_scan()
        }

        async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
            self.check()?;
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
            self.check()?;
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<bool, StoreError> {
            self.check()?;
            self.inner.delete(key).await
        }

        async fn delete_by_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
            self.check()?;
            self.inner.delete_by_prefix(prefix).await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            self.check()
        }

        async fn close(&self) {}
    }

    /// Never answers, to exercise the operation timeout.
    pub(crate) struct StalledStore;

    #[async_trait]
    impl CacheStore for StalledStore {
        fn backend(&self) -> &'static str {
            "stalled"
        }

        async fn get(&self, _key: &str) -> Result<Option<Bytes>, StoreError> {
            std::future::pending().await
        }

        async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
            std::future::pending().await
        }

        async fn delete_by_prefix(&self, _prefix: &str) -> Result<u64, StoreError> {
            std::future::pending().await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn close(&self) {}
    }
}
