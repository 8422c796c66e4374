//! Shared harness: the real router over an in-memory catalog, with a call
//! counter on product listings so tests can tell cache hits from origin reads.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{Method, Request, Response, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use storefront::application::blogs::BlogService;
use storefront::application::cart::CartService;
use storefront::application::catalog::ProductService;
use storefront::application::pagination::{Page, PageRequest};
use storefront::application::repos::{
    BlogQueryFilter, BlogsRepo, ListScope, ProductOrder, ProductQueryFilter, ProductsRepo,
    RepoError, TaxonomyRepo,
};
use storefront::application::taxonomy::TaxonomyService;
use storefront::cache::{CacheConfig, CacheState, CacheStore, MemoryStore};
use storefront::domain::entities::{BlogRecord, ProductRecord};
use storefront::domain::types::TaxonomyKind;
use storefront::infra::db::InMemoryRepositories;
use storefront::infra::http::{self, ApiState, RateGuard, RateLimits};
use storefront::infra::seed::load_seed_str;

pub const ADMIN_TOKEN: &str = "test-admin-token";
pub const MAX_AGE_CAP: Duration = Duration::from_secs(30);

pub const SEED: &str = r#"
[[categories]]
slug = "energy"
name = { en = "Energy" }

[[categories]]
slug = "solar"
name = { en = "Solar panels", de = "Solarmodule" }
parent = "energy"

[[brands]]
slug = "sunco"
name = { en = "SunCo" }

[[products]]
slug = "panel-400w"
name = { en = "Panel 400W", de = "Modul 400W" }
price_cents = 19999
currency = "USD"
category = "solar"
brand = "sunco"

[[products]]
slug = "panel-200w"
name = { en = "Panel 200W" }
price_cents = 9999
currency = "USD"
category = "solar"

[[products]]
slug = "inverter-5k"
name = { en = "Inverter 5kW" }
price_cents = 89900
currency = "USD"
category = "energy"

[[products]]
slug = "panel-prototype"
name = { en = "Panel prototype" }
price_cents = 1
currency = "USD"
category = "solar"
status = "draft"

[[blogs]]
slug = "choosing-panels"
title = { en = "Choosing panels" }
category = "solar"
primary_product = "panel-400w"
related_products = ["panel-200w"]
"#;

/// Product reads delegated to the shared repositories, counting listings.
/// Batch lookups by id can be switched to time out.
pub struct CountingProducts {
    inner: InMemoryRepositories,
    list_calls: AtomicUsize,
    fail_batches: AtomicBool,
}

impl CountingProducts {
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fail_batch_lookups(&self, fail: bool) {
        self.fail_batches.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProductsRepo for CountingProducts {
    async fn list_products(
        &self,
        scope: ListScope,
        filter: &ProductQueryFilter,
        order: ProductOrder,
        page: PageRequest,
    ) -> Result<Page<ProductRecord>, RepoError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_products(scope, filter, order, page).await
    }

    async fn find_product_by_slug(&self, slug: &str) -> Result<Option<ProductRecord>, RepoError> {
        self.inner.find_product_by_slug(slug).await
    }

    async fn find_product_by_id(&self, id: Uuid) -> Result<Option<ProductRecord>, RepoError> {
        self.inner.find_product_by_id(id).await
    }

    async fn find_products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<ProductRecord>, RepoError> {
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        self.inner.find_products_by_ids(ids).await
    }

    async fn count_products_in_term(
        &self,
        kind: TaxonomyKind,
        term_id: Uuid,
    ) -> Result<u64, RepoError> {
        self.inner.count_products_in_term(kind, term_id).await
    }
}

/// Blog reads delegated to the shared repositories; reverse lookups by
/// product can be switched to time out.
pub struct SwitchableBlogs {
    inner: InMemoryRepositories,
    fail_references: AtomicBool,
}

impl SwitchableBlogs {
    pub fn fail_reference_lookups(&self, fail: bool) {
        self.fail_references.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlogsRepo for SwitchableBlogs {
    async fn list_blogs(
        &self,
        scope: ListScope,
        filter: &BlogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<BlogRecord>, RepoError> {
        self.inner.list_blogs(scope, filter, page).await
    }

    async fn find_blog_by_slug(&self, slug: &str) -> Result<Option<BlogRecord>, RepoError> {
        self.inner.find_blog_by_slug(slug).await
    }

    async fn find_blog_by_id(&self, id: Uuid) -> Result<Option<BlogRecord>, RepoError> {
        self.inner.find_blog_by_id(id).await
    }

    async fn list_blogs_referencing_product(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<BlogRecord>, RepoError> {
        if self.fail_references.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        self.inner.list_blogs_referencing_product(product_id).await
    }

    async fn count_blogs_in_category(&self, category_id: Uuid) -> Result<u64, RepoError> {
        self.inner.count_blogs_in_category(category_id).await
    }
}

pub struct AppOptions {
    pub store: Arc<dyn CacheStore>,
    pub limits: RateLimits,
    pub admin_token: Option<&'static str>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            store: Arc::new(MemoryStore::new(
                std::num::NonZeroUsize::new(1_000).unwrap_or(std::num::NonZeroUsize::MIN),
            )),
            limits: RateLimits {
                window: Duration::from_secs(60),
                auth: 1_000,
                catalog: 1_000,
                mutation: 1_000,
                cart: 1_000,
            },
            admin_token: Some(ADMIN_TOKEN),
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub repos: InMemoryRepositories,
    pub products: Arc<CountingProducts>,
    pub blogs: Arc<SwitchableBlogs>,
    pub cache: CacheState,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond")
    }

    pub async fn product_id(&self, slug: &str) -> Uuid {
        self.repos
            .find_product_by_slug(slug)
            .await
            .expect("product query")
            .expect("product exists")
            .id
    }

    pub async fn term_id(&self, kind: TaxonomyKind, slug: &str) -> Uuid {
        self.repos
            .find_term_by_slug(kind, slug)
            .await
            .expect("term query")
            .expect("term exists")
            .id
    }

    pub async fn blog_id(&self, slug: &str) -> Uuid {
        self.repos
            .find_blog_by_slug(slug)
            .await
            .expect("blog query")
            .expect("blog exists")
            .id
    }
}

pub async fn build_app() -> TestApp {
    build_app_with(AppOptions::default()).await
}

pub async fn build_app_with(options: AppOptions) -> TestApp {
    let repos = InMemoryRepositories::new();
    load_seed_str(SEED, &repos).await.expect("seed loads");

    let shared = Arc::new(repos.clone());
    let products = Arc::new(CountingProducts {
        inner: repos.clone(),
        list_calls: AtomicUsize::new(0),
        fail_batches: AtomicBool::new(false),
    });
    let blogs = Arc::new(SwitchableBlogs {
        inner: repos.clone(),
        fail_references: AtomicBool::new(false),
    });
    let products_repo: Arc<dyn ProductsRepo> = products.clone();
    let blogs_repo: Arc<dyn BlogsRepo> = blogs.clone();
    let taxonomy_repo: Arc<dyn TaxonomyRepo> = shared.clone();
    let origin_timeout = Duration::from_secs(2);

    let cache = CacheState::new(options.store, CacheConfig::default());
    let state = ApiState {
        products: Arc::new(ProductService::new(
            products_repo.clone(),
            shared.clone(),
            blogs_repo.clone(),
            taxonomy_repo.clone(),
            cache.clone(),
            origin_timeout,
        )),
        blogs: Arc::new(BlogService::new(
            blogs_repo.clone(),
            shared.clone(),
            products_repo.clone(),
            taxonomy_repo.clone(),
            cache.clone(),
            origin_timeout,
        )),
        taxonomy: Arc::new(TaxonomyService::new(
            taxonomy_repo,
            shared.clone(),
            products_repo.clone(),
            blogs_repo,
            cache.clone(),
            origin_timeout,
        )),
        cart: Arc::new(CartService::new(
            shared,
            products_repo,
            cache.clone(),
            origin_timeout,
        )),
        cache: cache.clone(),
        rate_guard: RateGuard::new(options.limits),
        admin_token: options.admin_token.map(Arc::from),
        max_age_cap: MAX_AGE_CAP,
    };

    TestApp {
        router: http::build_router(state),
        repos,
        products,
        blogs,
        cache,
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

pub fn get_with(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).expect("request should build")
}

pub fn admin(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request should build")
}

pub fn session(method: Method, uri: &str, session_id: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-session-id", session_id);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request should build")
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("body should be json")
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
}
