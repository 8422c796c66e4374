//! Cache configuration.
//!
//! Controls the cache backend, TTL policy and store timeouts via `storefront.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

use super::keys::{Namespace, TtlClass};

const DEFAULT_KEY_PREFIX: &str = "storefront";
const DEFAULT_MEMORY_CAPACITY: usize = 10_000;
const DEFAULT_OP_TIMEOUT_MS: u64 = 250;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_LISTING_TTL_SECS: u64 = 120;
const DEFAULT_DETAIL_TTL_SECS: u64 = 600;
const DEFAULT_REFERENCE_TTL_SECS: u64 = 1_800;
const DEFAULT_CART_TTL_SECS: u64 = 60;

/// Which store implementation backs the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackendKind {
    Memory,
    Redis,
    None,
}

impl CacheBackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
            Self::None => "none",
        }
    }
}

/// Cache configuration from `storefront.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch; when off every read goes to the origin.
    pub enabled: bool,
    pub backend: CacheBackendKind,
    /// Connection string used when `backend = "redis"`.
    pub redis_url: Option<String>,
    /// First segment of every key, shared by all instances of one deployment.
    pub key_prefix: String,
    /// Maximum entries held by the in-memory backend.
    pub memory_capacity: usize,
    /// Upper bound for a single store operation.
    pub op_timeout_ms: u64,
    /// Upper bound for the initial backend connection.
    pub connect_timeout_ms: u64,
    pub listing_ttl_secs: u64,
    pub detail_ttl_secs: u64,
    /// Category tree and brand/category listings.
    pub reference_ttl_secs: u64,
    pub cart_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackendKind::Memory,
            redis_url: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            op_timeout_ms: DEFAULT_OP_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            listing_ttl_secs: DEFAULT_LISTING_TTL_SECS,
            detail_ttl_secs: DEFAULT_DETAIL_TTL_SECS,
            reference_ttl_secs: DEFAULT_REFERENCE_TTL_SECS,
            cart_ttl_secs: DEFAULT_CART_TTL_SECS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            backend: settings.backend,
            redis_url: settings.redis_url.clone(),
            key_prefix: settings.key_prefix.clone(),
            memory_capacity: settings.memory_capacity.get() as usize,
            op_timeout_ms: settings.op_timeout_ms.get() as u64,
            connect_timeout_ms: settings.connect_timeout_ms.get() as u64,
            listing_ttl_secs: settings.listing_ttl_secs as u64,
            detail_ttl_secs: settings.detail_ttl_secs as u64,
            reference_ttl_secs: settings.reference_ttl_secs as u64,
            cart_ttl_secs: settings.cart_ttl_secs as u64,
        }
    }
}

impl CacheConfig {
    /// Returns true when a real backend should be connected.
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.backend != CacheBackendKind::None
    }

    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    /// TTL applied to entries of the given namespace. Zero disables caching.
    pub fn ttl_for(&self, namespace: Namespace) -> Duration {
        let secs = match namespace.ttl_class() {
            TtlClass::Listing => self.listing_ttl_secs,
            TtlClass::Detail => self.detail_ttl_secs,
            TtlClass::Reference => self.reference_ttl_secs,
            TtlClass::Session => self.cart_ttl_secs,
        };
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.is_enabled());
        assert_eq!(config.backend, CacheBackendKind::Memory);
        assert_eq!(config.key_prefix, "storefront");
        assert_eq!(config.listing_ttl_secs, 120);
        assert_eq!(config.detail_ttl_secs, 600);
        assert_eq!(config.reference_ttl_secs, 1800);
        assert_eq!(config.cart_ttl_secs, 60);
    }

    #[test]
    fn ttl_follows_namespace_class() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl_for(Namespace::Products), Duration::from_secs(120));
        assert_eq!(config.ttl_for(Namespace::Blogs), Duration::from_secs(120));
        assert_eq!(config.ttl_for(Namespace::Product), Duration::from_secs(600));
        assert_eq!(config.ttl_for(Namespace::Blog), Duration::from_secs(600));
        assert_eq!(
            config.ttl_for(Namespace::CategoryTree),
            Duration::from_secs(1800)
        );
        assert_eq!(config.ttl_for(Namespace::Brands), Duration::from_secs(1800));
        assert_eq!(config.ttl_for(Namespace::Cart), Duration::from_secs(60));
    }

    #[test]
    fn backend_none_disables_cache() {
        let config = CacheConfig {
            backend: CacheBackendKind::None,
            ..Default::default()
        };
        assert!(!config.is_enabled());
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            memory_capacity: 0,
            op_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.memory_capacity_non_zero().get(), 1);
        assert_eq!(config.op_timeout(), Duration::from_millis(1));
    }
}
