use std::sync::Arc;
use std::time::Duration;

use crate::application::blogs::BlogService;
use crate::application::cart::CartService;
use crate::application::catalog::ProductService;
use crate::application::taxonomy::TaxonomyService;
use crate::cache::{CacheState, Namespace};
use crate::infra::http::rate_limit::RateGuard;

#[derive(Clone)]
pub struct ApiState {
    pub products: Arc<ProductService>,
    pub blogs: Arc<BlogService>,
    pub taxonomy: Arc<TaxonomyService>,
    pub cart: Arc<CartService>,
    pub cache: CacheState,
    pub rate_guard: RateGuard,
    pub admin_token: Option<Arc<str>>,
    pub max_age_cap: Duration,
}

impl ApiState {
    /// Client-facing freshness for a namespace: its TTL bounded by the configured cap.
    pub fn max_age(&self, namespace: Namespace) -> Duration {
        self.cache.config.ttl_for(namespace).min(self.max_age_cap)
    }
}
