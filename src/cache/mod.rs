//! Storefront response cache.
//!
//! Read-through caching of catalog responses with declarative invalidation:
//!
//! - **Store**: memory, Redis or no-op backend behind a fail-safe [`GuardedStore`]
//! - **Keys**: deterministic keys from scope, namespace and canonical filters
//! - **Read-through**: lookup, compute on miss, store success envelopes
//! - **Invalidation**: rule table from entity kinds to key prefixes
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `storefront.toml`:
//!
//! ```toml
//! [cache]
//! backend = "redis"
//! redis_url = "redis://127.0.0.1:6379"
//! listing_ttl_secs = 120
//! # ... see config.rs for all options
//! ```

mod config;
mod invalidation;
mod keys;
mod lock;
mod memory;
mod read_through;
mod redis;
mod registry;
mod state;
mod store;

pub use self::config::{CacheBackendKind, CacheConfig};
pub use invalidation::{
    EntityKind, EntityRef, InvalidationCoordinator, InvalidationPlan, InvalidationReport,
    InvalidationRules, KeyTemplate, Mutation, MutationKind,
};
pub use keys::{
    CacheKey, CacheScope, DetailIdent, KeyParams, KeyPolicy, KeySerializationError, Namespace,
    PageWindow, SortDirection, SortKey, TtlClass, UnknownNamespace, canonical_json,
    escape_component, filter_digest,
};
pub use memory::MemoryStore;
pub use read_through::{CacheOutcome, Cacheable, Lookup, ReadThrough};
pub use self::redis::RedisStore;
pub use registry::CacheRegistry;
pub use state::CacheState;
pub use store::{CacheStore, GuardedStore, NoopStore, PrefixPurge, StoreError, connect};
