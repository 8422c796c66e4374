//! Read-through wrapper.
//!
//! The only way application code reads the cache: look the key up, compute
//! on miss, store the result when it is a success envelope. Compute errors
//! propagate untouched and are never stored. There is no single-flight
//! coordination; concurrent misses each compute and the last write wins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::registry::CacheRegistry;
use super::store::GuardedStore;

pub(crate) const METRIC_CACHE_HIT_TOTAL: &str = "storefront_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS_TOTAL: &str = "storefront_cache_miss_total";
pub(crate) const METRIC_CACHE_BYPASS_TOTAL: &str = "storefront_cache_bypass_total";
pub(crate) const METRIC_CACHE_WRITE_FAILURE_TOTAL: &str = "storefront_cache_write_failure_total";

/// Values that know whether they may be stored.
pub trait Cacheable {
    fn is_cacheable(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
    Bypass,
}

impl CacheOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Bypass => "BYPASS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lookup<T> {
    pub value: T,
    pub outcome: CacheOutcome,
}

impl<T> Lookup<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        Lookup {
            value: f(self.value),
            outcome: self.outcome,
        }
    }
}

pub struct ReadThrough {
    store: GuardedStore,
    registry: Arc<CacheRegistry>,
    config: Arc<CacheConfig>,
}

impl ReadThrough {
    pub fn new(
        store: GuardedStore,
        registry: Arc<CacheRegistry>,
        config: Arc<CacheConfig>,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Read through with the TTL of the key's namespace.
    pub async fn fetch<T, E, F, Fut>(
        &self,
        key: Option<&CacheKey>,
        compute: F,
    ) -> Result<Lookup<T>, E>
    where
        T: Serialize + DeserializeOwned + Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let ttl = key
            .map(|key| self.config.ttl_for(key.namespace()))
            .unwrap_or_default();
        self.fetch_with_ttl(key, ttl, compute).await
    }

    /// `None` keys and admin-scoped keys bypass both lookup and store.
    #[instrument(
        level = "debug",
        skip_all,
        fields(key = key.map(CacheKey::as_str).unwrap_or("-"), ttl_secs = ttl.as_secs())
    )]
    pub async fn fetch_with_ttl<T, E, F, Fut>(
        &self,
        key: Option<&CacheKey>,
        ttl: Duration,
        compute: F,
    ) -> Result<Lookup<T>, E>
    where
        T: Serialize + DeserializeOwned + Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(key) = key.filter(|key| key.scope().is_cacheable()) else {
            let namespace = key.map(|key| key.namespace().as_str()).unwrap_or("unknown");
            counter!(METRIC_CACHE_BYPASS_TOTAL, "namespace" => namespace).increment(1);
            let value = compute().await?;
            return Ok(Lookup {
                value,
                outcome: CacheOutcome::Bypass,
            });
        };
        let namespace = key.namespace().as_str();

        if let Some(body) = self.store.get(key.as_str()).await {
            match serde_json::from_slice::<T>(&body) {
                Ok(value) => {
                    counter!(METRIC_CACHE_HIT_TOTAL, "namespace" => namespace).increment(1);
                    debug!(result = "hit", "Cache lookup");
                    return Ok(Lookup {
                        value,
                        outcome: CacheOutcome::Hit,
                    });
                }
                Err(err) => {
                    warn!(
                        key = key.as_str(),
                        error = %err,
                        result = "discarded",
                        "Cached payload failed to decode"
                    );
                    self.store.delete(key.as_str()).await;
                    self.registry.forget(key.as_str());
                }
            }
        }

        counter!(METRIC_CACHE_MISS_TOTAL, "namespace" => namespace).increment(1);
        debug!(result = "miss", "Cache lookup");
        let value = compute().await?;

        if ttl.is_zero() || !value.is_cacheable() {
            return Ok(Lookup {
                value,
                outcome: CacheOutcome::Miss,
            });
        }

        // Without prefix scan an entry is only purgeable through the registry,
        // so the key is reserved there before the write.
        let registered = !self.store.supports_prefix_scan();
        if registered && !self.registry.record(key.as_str(), ttl) {
            counter!(METRIC_CACHE_WRITE_FAILURE_TOTAL, "namespace" => namespace).increment(1);
            return Ok(Lookup {
                value,
                outcome: CacheOutcome::Miss,
            });
        }

        match serde_json::to_vec(&value) {
            Ok(body) => {
                if !self.store.set(key.as_str(), Bytes::from(body), ttl).await {
                    counter!(METRIC_CACHE_WRITE_FAILURE_TOTAL, "namespace" => namespace)
                        .increment(1);
                    if registered {
                        self.registry.forget(key.as_str());
                    }
                }
            }
            Err(err) => {
                counter!(METRIC_CACHE_WRITE_FAILURE_TOTAL, "namespace" => namespace).increment(1);
                warn!(key = key.as_str(), error = %err, "Computed value failed to encode");
                if registered {
                    self.registry.forget(key.as_str());
                }
            }
        }

        Ok(Lookup {
            value,
            outcome: CacheOutcome::Miss,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;

    use super::*;
    use crate::cache::keys::{CacheScope, DetailIdent, KeyPolicy, Namespace};
    use crate::cache::memory::MemoryStore;
    use crate::cache::store::testing::FlakyStore;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        success: bool,
        name: String,
    }

    impl Cacheable for Payload {
        fn is_cacheable(&self) -> bool {
            self.success
        }
    }

    fn memory() -> MemoryStore {
        MemoryStore::new(NonZeroUsize::new(32).expect("non-zero"))
    }

    fn wrapper(store: Arc<dyn crate::cache::CacheStore>) -> ReadThrough {
        ReadThrough::new(
            GuardedStore::new(store, Duration::from_millis(50)),
            Arc::new(CacheRegistry::default()),
            Arc::new(CacheConfig::default()),
        )
    }

    fn product_key(scope: CacheScope) -> CacheKey {
        KeyPolicy::new("t").detail(
            scope,
            Namespace::Product,
            DetailIdent::Slug("panel".into()),
            Some("en"),
        )
    }

    async fn compute_counted(
        calls: &AtomicUsize,
        success: bool,
    ) -> Result<Payload, std::convert::Infallible> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Payload {
            success,
            name: "panel".into(),
        })
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let cache = wrapper(Arc::new(memory()));
        let key = product_key(CacheScope::Public);
        let calls = AtomicUsize::new(0);

        let first = cache
            .fetch(Some(&key), || compute_counted(&calls, true))
            .await
            .expect("infallible");
        let second = cache
            .fetch(Some(&key), || compute_counted(&calls, true))
            .await
            .expect("infallible");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.outcome, CacheOutcome::Miss);
        assert_eq!(second.outcome, CacheOutcome::Hit);
        assert_eq!(first.value, second.value);
    }

    #[tokio::test]
    async fn admin_scope_never_touches_the_store() {
        let store = Arc::new(memory());
        let cache = wrapper(store.clone());
        let key = product_key(CacheScope::Admin);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let lookup = cache
                .fetch(Some(&key), || compute_counted(&calls, true))
                .await
                .expect("infallible");
            assert_eq!(lookup.outcome, CacheOutcome::Bypass);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn errors_and_unsuccessful_envelopes_are_not_stored() {
        let store = Arc::new(memory());
        let cache = wrapper(store.clone());
        let key = product_key(CacheScope::Public);

        let err = cache
            .fetch::<Payload, _, _, _>(Some(&key), || async { Err::<Payload, _>("origin down") })
            .await
            .expect_err("compute error should propagate");
        assert_eq!(err, "origin down");
        assert!(store.is_empty());

        let calls = AtomicUsize::new(0);
        cache
            .fetch(Some(&key), || compute_counted(&calls, false))
            .await
            .expect("infallible");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn undecodable_entry_is_recomputed_and_replaced() {
        let store = Arc::new(memory());
        let key = product_key(CacheScope::Public);
        crate::cache::CacheStore::set(
            store.as_ref(),
            key.as_str(),
            Bytes::from_static(b"{not json"),
            Duration::from_secs(60),
        )
        .await
        .expect("seed");
        let cache = wrapper(store);
        let calls = AtomicUsize::new(0);

        let lookup = cache
            .fetch(Some(&key), || compute_counted(&calls, true))
            .await
            .expect("infallible");
        assert_eq!(lookup.outcome, CacheOutcome::Miss);

        let again = cache
            .fetch(Some(&key), || compute_counted(&calls, true))
            .await
            .expect("infallible");
        assert_eq!(again.outcome, CacheOutcome::Hit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unavailable_store_still_returns_computed_value() {
        let flaky = Arc::new(FlakyStore::new(memory()));
        flaky.set_down(true);
        let cache = wrapper(flaky);
        let key = product_key(CacheScope::Public);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let lookup = cache
                .fetch(Some(&key), || compute_counted(&calls, true))
                .await
                .expect("infallible");
            assert_eq!(lookup.outcome, CacheOutcome::Miss);
            assert_eq!(lookup.value.name, "panel");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_is_recomputed_after_ttl() {
        let cache = wrapper(Arc::new(memory()));
        let key = product_key(CacheScope::Public);
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_secs(600);

        cache
            .fetch_with_ttl(Some(&key), ttl, || compute_counted(&calls, true))
            .await
            .expect("infallible");

        tokio::time::advance(ttl - Duration::from_millis(1)).await;
        let before = cache
            .fetch_with_ttl(Some(&key), ttl, || compute_counted(&calls, true))
            .await
            .expect("infallible");
        assert_eq!(before.outcome, CacheOutcome::Hit);

        tokio::time::advance(Duration::from_millis(2)).await;
        let after = cache
            .fetch_with_ttl(Some(&key), ttl, || compute_counted(&calls, true))
            .await
            .expect("infallible");
        assert_eq!(after.outcome, CacheOutcome::Miss);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn writes_are_registered_for_non_enumerating_stores() {
        let registry = Arc::new(CacheRegistry::default());
        let cache = ReadThrough::new(
            GuardedStore::new(
                Arc::new(memory().without_prefix_scan()),
                Duration::from_millis(50),
            ),
            registry.clone(),
            Arc::new(CacheConfig::default()),
        );
        let key = product_key(CacheScope::Public);
        let calls = AtomicUsize::new(0);

        cache
            .fetch(Some(&key), || compute_counted(&calls, true))
            .await
            .expect("infallible");
        assert_eq!(registry.keys_with_prefix("t:pub:product:"), vec![key.to_string()]);
    }

    #[tokio::test]
    async fn full_registry_skips_the_write_so_purges_stay_complete() {
        let store = Arc::new(memory().without_prefix_scan());
        let registry = Arc::new(CacheRegistry::new(1));
        let cache = ReadThrough::new(
            GuardedStore::new(store.clone(), Duration::from_millis(50)),
            registry.clone(),
            Arc::new(CacheConfig::default()),
        );
        let policy = KeyPolicy::new("t");
        let first = policy.detail(
            CacheScope::Public,
            Namespace::Blog,
            DetailIdent::Slug("a".into()),
            None,
        );
        let second = policy.detail(
            CacheScope::Public,
            Namespace::Blog,
            DetailIdent::Slug("b".into()),
            None,
        );
        let calls = AtomicUsize::new(0);

        for key in [&first, &second] {
            cache
                .fetch(Some(key), || compute_counted(&calls, true))
                .await
                .expect("infallible");
        }
        assert_eq!(store.len(), 1);
        assert_eq!(registry.keys_with_prefix("t:pub:blog:"), vec![first.to_string()]);

        let again = cache
            .fetch(Some(&second), || compute_counted(&calls, true))
            .await
            .expect("infallible");
        assert_eq!(again.outcome, CacheOutcome::Miss);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
