//! Product catalog service: cached product reads, product and promotion writes.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{
    BlogsRepo, CreateProductParams, ListScope, ProductOrder, ProductQueryFilter, ProductsRepo,
    ProductsWriteRepo, RepoError, TaxonomyRepo, UpdateProductParams, with_timeout,
};
use crate::application::views::{
    BlogSnippet, ItemEnvelope, ListEnvelope, ProductDetail, ProductSummary,
};
use crate::cache::{
    CacheScope, CacheState, DetailIdent, EntityKind, EntityRef, Lookup, Mutation, MutationKind,
    Namespace, SortDirection, SortKey,
};
use crate::domain::entities::{
    BlogRecord, LocalizedText, ProductRecord, Promotion, validate_price_cents,
};
use crate::domain::slug::{SlugAsyncError, generate_unique_slug_async, validate_slug};
use crate::domain::types::{Locale, PublicationStatus, TaxonomyKind};

/// Public listing filter, keyed by taxonomy slugs as they appear in URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub brand: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    /// Admin listings only; ignored for public scope.
    pub status: Option<PublicationStatus>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

impl ProductSort {
    pub fn sort_key(self) -> SortKey {
        match self {
            Self::Newest => SortKey::new("created_at", SortDirection::Desc),
            Self::PriceAsc => SortKey::new("price", SortDirection::Asc),
            Self::PriceDesc => SortKey::new("price", SortDirection::Desc),
            Self::Name => SortKey::new("name", SortDirection::Asc),
        }
    }

    fn order(self) -> ProductOrder {
        match self {
            Self::Newest => ProductOrder::Newest,
            Self::PriceAsc => ProductOrder::PriceAsc,
            Self::PriceDesc => ProductOrder::PriceDesc,
            Self::Name => ProductOrder::Name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductListQuery {
    pub filter: ProductFilter,
    pub sort: ProductSort,
    pub page: PageRequest,
    pub locale: Locale,
}

/// Create/update payload for products.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub slug: Option<String>,
    pub name: LocalizedText,
    #[serde(default)]
    pub description: LocalizedText,
    pub price_cents: u64,
    pub currency: String,
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    #[serde(default = "default_status")]
    pub status: PublicationStatus,
}

fn default_status() -> PublicationStatus {
    PublicationStatus::Draft
}

struct ValidatedProduct {
    name: LocalizedText,
    description: LocalizedText,
    currency: String,
}

pub struct ProductService {
    products: Arc<dyn ProductsRepo>,
    writer: Arc<dyn ProductsWriteRepo>,
    blogs: Arc<dyn BlogsRepo>,
    taxonomy: Arc<dyn TaxonomyRepo>,
    cache: CacheState,
    origin_timeout: Duration,
}

impl ProductService {
    pub fn new(
        products: Arc<dyn ProductsRepo>,
        writer: Arc<dyn ProductsWriteRepo>,
        blogs: Arc<dyn BlogsRepo>,
        taxonomy: Arc<dyn TaxonomyRepo>,
        cache: CacheState,
        origin_timeout: Duration,
    ) -> Self {
        Self {
            products,
            writer,
            blogs,
            taxonomy,
            cache,
            origin_timeout,
        }
    }

    #[instrument(skip_all, fields(scope = scope.as_str(), page = query.page.page()))]
    pub async fn list_products(
        &self,
        scope: CacheScope,
        query: &ProductListQuery,
    ) -> Result<Lookup<ListEnvelope<ProductSummary>>, AppError> {
        let mut query = query.clone();
        if scope == CacheScope::Public {
            query.filter.status = None;
        }
        if let (Some(min), Some(max)) = (query.filter.min_price, query.filter.max_price)
            && min > max
        {
            return Err(AppError::validation("min_price must not exceed max_price"));
        }

        let key = self
            .cache
            .keys
            .listing(
                scope,
                Namespace::Products,
                &query.filter,
                query.page.window(),
                Some(&query.sort.sort_key()),
                Some(query.locale.as_str()),
            )
            .map_err(|err| warn!(error = %err, "Product listing key unavailable; bypassing cache"))
            .ok();

        self.cache
            .read_through
            .fetch(key.as_ref(), || self.load_products(scope, &query))
            .await
    }

    async fn load_products(
        &self,
        scope: CacheScope,
        query: &ProductListQuery,
    ) -> Result<ListEnvelope<ProductSummary>, AppError> {
        let Some(filter) = self.resolve_filter(&query.filter).await? else {
            return Ok(ListEnvelope::from_page(Page::from_sorted(Vec::new(), query.page)));
        };
        let list_scope = match scope {
            CacheScope::Public => ListScope::Public,
            CacheScope::Admin => ListScope::Admin {
                status: query.filter.status,
            },
        };

        let page = self
            .origin(
                self.products
                    .list_products(list_scope, &filter, query.sort.order(), query.page),
            )
            .await?;
        Ok(ListEnvelope::from_page(page.map(|record| {
            ProductSummary::from_record(&record, &query.locale)
        })))
    }

    /// Resolves taxonomy slugs; `None` when a slug matches nothing.
    async fn resolve_filter(
        &self,
        filter: &ProductFilter,
    ) -> Result<Option<ProductQueryFilter>, AppError> {
        let mut resolved = ProductQueryFilter {
            search: filter
                .search
                .as_deref()
                .map(str::trim)
                .filter(|search| !search.is_empty())
                .map(str::to_string),
            min_price_cents: filter.min_price,
            max_price_cents: filter.max_price,
            ..Default::default()
        };

        if let Some(slug) = filter.category.as_deref() {
            match self
                .origin(self.taxonomy.find_term_by_slug(TaxonomyKind::Category, slug))
                .await?
            {
                Some(term) => resolved.category_id = Some(term.id),
                None => return Ok(None),
            }
        }
        if let Some(slug) = filter.brand.as_deref() {
            match self
                .origin(self.taxonomy.find_term_by_slug(TaxonomyKind::Brand, slug))
                .await?
            {
                Some(term) => resolved.brand_id = Some(term.id),
                None => return Ok(None),
            }
        }
        Ok(Some(resolved))
    }

    #[instrument(skip_all, fields(scope = scope.as_str(), slug = slug))]
    pub async fn get_product(
        &self,
        scope: CacheScope,
        slug: &str,
        locale: &Locale,
    ) -> Result<Lookup<ItemEnvelope<ProductDetail>>, AppError> {
        let key = self.cache.keys.detail(
            scope,
            Namespace::Product,
            DetailIdent::Slug(slug.to_string()),
            Some(locale.as_str()),
        );
        self.cache
            .read_through
            .fetch(Some(&key), || self.load_product(scope, slug, locale))
            .await
    }

    async fn load_product(
        &self,
        scope: CacheScope,
        slug: &str,
        locale: &Locale,
    ) -> Result<ItemEnvelope<ProductDetail>, AppError> {
        let record = self
            .origin(self.products.find_product_by_slug(slug))
            .await?
            .filter(|record| scope == CacheScope::Admin || record.status.is_public())
            .ok_or(AppError::NotFound)?;

        let mut blogs: Vec<BlogRecord> = self
            .origin(self.blogs.list_blogs_referencing_product(record.id))
            .await?
            .into_iter()
            .filter(|blog| scope == CacheScope::Admin || blog.status.is_public())
            .collect();
        blogs.sort_by(|a, b| a.slug.cmp(&b.slug));

        Ok(ItemEnvelope::new(ProductDetail {
            summary: ProductSummary::from_record(&record, locale),
            description: record.description.resolve(locale).to_string(),
            related_blogs: blogs
                .iter()
                .map(|blog| BlogSnippet::from_record(blog, locale))
                .collect(),
        }))
    }

    #[instrument(skip(self, input))]
    pub async fn create_product(&self, input: ProductInput) -> Result<ProductRecord, AppError> {
        let validated = self.validate(&input).await?;
        let slug = match input.slug.as_deref() {
            Some(slug) => {
                let slug = validate_slug(slug)
                    .map_err(|err| AppError::validation(err.to_string()))?
                    .to_string();
                self.ensure_slug_free(&slug, None).await?;
                slug
            }
            None => self.derive_slug(&validated.name).await?,
        };

        let record = self
            .origin(self.writer.create_product(CreateProductParams {
                slug,
                name: validated.name,
                description: validated.description,
                price_cents: input.price_cents,
                currency: validated.currency,
                category_id: input.category_id,
                brand_id: input.brand_id,
                status: input.status,
            }))
            .await?;

        info!(product_id = %record.id, slug = %record.slug, "Product created");
        self.cache
            .invalidator
            .invalidate(
                &Mutation::new(EntityKind::Product, MutationKind::Created, record.id)
                    .with_slug(&record.slug),
            )
            .await;
        Ok(record)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        id: Uuid,
        input: ProductInput,
    ) -> Result<ProductRecord, AppError> {
        let existing = self
            .origin(self.products.find_product_by_id(id))
            .await?
            .ok_or(AppError::NotFound)?;
        let validated = self.validate(&input).await?;
        let slug = match input.slug.as_deref() {
            Some(slug) => {
                let slug = validate_slug(slug)
                    .map_err(|err| AppError::validation(err.to_string()))?
                    .to_string();
                self.ensure_slug_free(&slug, Some(id)).await?;
                slug
            }
            None => existing.slug.clone(),
        };

        // Blogs reference products, never the reverse, so the relations are
        // the same before and after the write.
        let blogs = self.referencing_blogs(id).await;
        let record = self
            .origin(self.writer.update_product(UpdateProductParams {
                id,
                slug,
                name: validated.name,
                description: validated.description,
                price_cents: input.price_cents,
                currency: validated.currency,
                category_id: input.category_id,
                brand_id: input.brand_id,
                status: input.status,
            }))
            .await?;

        info!(product_id = %id, slug = %record.slug, "Product updated");
        self.invalidate_with_blogs(
            Mutation::new(EntityKind::Product, MutationKind::Updated, id)
                .with_slug(&existing.slug)
                .with_slug(&record.slug),
            blogs,
        )
        .await;
        Ok(record)
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<ProductRecord, AppError> {
        let blogs = self.referencing_blogs(id).await;
        let record = self.origin(self.writer.delete_product(id)).await?;

        info!(product_id = %id, slug = %record.slug, "Product deleted");
        self.invalidate_with_blogs(
            Mutation::new(EntityKind::Product, MutationKind::Deleted, id).with_slug(&record.slug),
            blogs,
        )
        .await;
        Ok(record)
    }

    /// Sets or clears the promotion of a product.
    #[instrument(skip(self, promotion), fields(clear = promotion.is_none()))]
    pub async fn set_promotion(
        &self,
        id: Uuid,
        promotion: Option<Promotion>,
    ) -> Result<ProductRecord, AppError> {
        if let Some(promotion) = &promotion {
            promotion.validate()?;
        }
        let kind = if promotion.is_some() {
            MutationKind::Updated
        } else {
            MutationKind::Deleted
        };

        let blogs = self.referencing_blogs(id).await;
        let record = self
            .origin(self.writer.set_promotion(id, promotion))
            .await?;

        info!(product_id = %id, mutation = kind.as_str(), "Promotion changed");
        self.invalidate_with_blogs(
            Mutation::new(EntityKind::Promotion, kind, id)
                .with_relation(EntityRef::new(EntityKind::Product, id).with_slug(&record.slug)),
            blogs,
        )
        .await;
        Ok(record)
    }

    /// Blogs that reference the product, or `None` when the lookup failed.
    async fn referencing_blogs(&self, product_id: Uuid) -> Option<Vec<EntityRef>> {
        match self
            .origin(self.blogs.list_blogs_referencing_product(product_id))
            .await
        {
            Ok(blogs) => Some(
                blogs
                    .iter()
                    .map(|blog| EntityRef::new(EntityKind::Blog, blog.id).with_slug(&blog.slug))
                    .collect(),
            ),
            Err(err) => {
                warn!(
                    product_id = %product_id,
                    error = %err,
                    "Referencing blogs lookup failed; blog caches will be purged whole"
                );
                None
            }
        }
    }

    /// Runs the mutation's rules. Without known relations every blog view may
    /// embed the product, so both blog namespaces are purged instead.
    async fn invalidate_with_blogs(&self, mutation: Mutation, blogs: Option<Vec<EntityRef>>) {
        let invalidator = &self.cache.invalidator;
        match blogs {
            Some(blogs) => {
                invalidator.invalidate(&mutation.with_relations(blogs)).await;
            }
            None => {
                invalidator.invalidate(&mutation).await;
                for namespace in [Namespace::Blog, Namespace::Blogs] {
                    invalidator.purge_namespace(namespace).await;
                }
            }
        }
    }

    async fn validate(&self, input: &ProductInput) -> Result<ValidatedProduct, AppError> {
        let name = input.name.clone().normalized()?;
        if name.is_blank() {
            return Err(AppError::validation("product name must not be empty"));
        }
        let description = input.description.clone().normalized()?;
        validate_price_cents(input.price_cents)?;

        let currency = input.currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return Err(AppError::validation(
                "currency must be a three-letter ISO 4217 code",
            ));
        }

        for (kind, id) in [
            (TaxonomyKind::Category, input.category_id),
            (TaxonomyKind::Brand, input.brand_id),
        ] {
            if let Some(id) = id
                && self
                    .origin(self.taxonomy.find_term_by_id(kind, id))
                    .await?
                    .is_none()
            {
                return Err(AppError::validation(format!(
                    "unknown {} `{id}`",
                    kind.as_str()
                )));
            }
        }

        Ok(ValidatedProduct {
            name,
            description,
            currency,
        })
    }

    async fn ensure_slug_free(&self, slug: &str, owner: Option<Uuid>) -> Result<(), AppError> {
        match self.origin(self.products.find_product_by_slug(slug)).await? {
            Some(existing) if Some(existing.id) != owner => Err(AppError::conflict(format!(
                "product slug `{slug}` is already taken"
            ))),
            _ => Ok(()),
        }
    }

    async fn derive_slug(&self, name: &LocalizedText) -> Result<String, AppError> {
        let source = name.resolve(&Locale::default_locale()).to_string();
        let products = Arc::clone(&self.products);
        let limit = self.origin_timeout;
        generate_unique_slug_async(&source, move |candidate| {
            let products = Arc::clone(&products);
            async move {
                with_timeout(limit, products.find_product_by_slug(&candidate))
                    .await
                    .map(|found| found.is_none())
            }
        })
        .await
        .map_err(|err| match err {
            SlugAsyncError::Slug(err) => AppError::validation(err.to_string()),
            SlugAsyncError::Predicate(err) => AppError::from(err),
        })
    }

    async fn origin<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, RepoError>>,
    ) -> Result<T, RepoError> {
        with_timeout(self.origin_timeout, fut).await
    }
}
