use std::sync::Arc;

use super::config::CacheConfig;
use super::invalidation::{InvalidationCoordinator, InvalidationRules};
use super::keys::KeyPolicy;
use super::read_through::ReadThrough;
use super::registry::CacheRegistry;
use super::store::{CacheStore, GuardedStore};

/// Everything a service needs to read through and invalidate the cache.
///
/// Built once at startup around an explicitly connected store.
#[derive(Clone)]
pub struct CacheState {
    pub config: Arc<CacheConfig>,
    pub keys: Arc<KeyPolicy>,
    pub store: GuardedStore,
    pub read_through: Arc<ReadThrough>,
    pub invalidator: Arc<InvalidationCoordinator>,
}

impl CacheState {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self::with_rules(store, config, InvalidationRules::standard())
    }

    pub fn with_rules(
        store: Arc<dyn CacheStore>,
        config: CacheConfig,
        rules: InvalidationRules,
    ) -> Self {
        let config = Arc::new(config);
        let keys = Arc::new(KeyPolicy::new(config.key_prefix.clone()));
        let store = GuardedStore::new(store, config.op_timeout());
        let registry = Arc::new(CacheRegistry::new(config.memory_capacity));

        let read_through = Arc::new(ReadThrough::new(
            store.clone(),
            registry.clone(),
            config.clone(),
        ));
        let invalidator = Arc::new(InvalidationCoordinator::new(
            store.clone(),
            registry,
            keys.clone(),
            rules,
        ));

        Self {
            config,
            keys,
            store,
            read_through,
            invalidator,
        }
    }
}
