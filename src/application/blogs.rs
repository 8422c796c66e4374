//! Blog service: cached blog reads and blog writes that fan out to products.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{
    BlogQueryFilter, BlogsRepo, BlogsWriteRepo, CreateBlogParams, ListScope, ProductsRepo,
    RepoError, TaxonomyRepo, UpdateBlogParams, with_timeout,
};
use crate::application::views::{
    BlogDetail, BlogSummary, ItemEnvelope, ListEnvelope, ProductSnippet, format_timestamp,
};
use crate::cache::{
    CacheScope, CacheState, DetailIdent, EntityKind, EntityRef, Lookup, Mutation, MutationKind,
    Namespace, SortDirection, SortKey,
};
use crate::domain::entities::{BlogRecord, LocalizedText, ProductRecord};
use crate::domain::slug::{SlugAsyncError, generate_unique_slug_async, validate_slug};
use crate::domain::types::{Locale, PublicationStatus, TaxonomyKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogFilter {
    /// Slug of a product the blog must reference.
    pub product: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    /// Admin listings only; ignored for public scope.
    pub status: Option<PublicationStatus>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlogListQuery {
    pub filter: BlogFilter,
    pub page: PageRequest,
    pub locale: Locale,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlogInput {
    pub slug: Option<String>,
    pub title: LocalizedText,
    #[serde(default)]
    pub body: LocalizedText,
    #[serde(default = "default_status")]
    pub status: PublicationStatus,
    pub category_id: Option<Uuid>,
    pub primary_product: Option<Uuid>,
    #[serde(default)]
    pub related_products: Vec<Uuid>,
}

fn default_status() -> PublicationStatus {
    PublicationStatus::Draft
}

fn newest_first() -> SortKey {
    SortKey::new("created_at", SortDirection::Desc)
}

pub struct BlogService {
    blogs: Arc<dyn BlogsRepo>,
    writer: Arc<dyn BlogsWriteRepo>,
    products: Arc<dyn ProductsRepo>,
    taxonomy: Arc<dyn TaxonomyRepo>,
    cache: CacheState,
    origin_timeout: Duration,
}

impl BlogService {
    pub fn new(
        blogs: Arc<dyn BlogsRepo>,
        writer: Arc<dyn BlogsWriteRepo>,
        products: Arc<dyn ProductsRepo>,
        taxonomy: Arc<dyn TaxonomyRepo>,
        cache: CacheState,
        origin_timeout: Duration,
    ) -> Self {
        Self {
            blogs,
            writer,
            products,
            taxonomy,
            cache,
            origin_timeout,
        }
    }

    #[instrument(skip_all, fields(scope = scope.as_str(), page = query.page.page()))]
    pub async fn list_blogs(
        &self,
        scope: CacheScope,
        query: &BlogListQuery,
    ) -> Result<Lookup<ListEnvelope<BlogSummary>>, AppError> {
        let mut query = query.clone();
        if scope == CacheScope::Public {
            query.filter.status = None;
        }

        let key = self
            .cache
            .keys
            .listing(
                scope,
                Namespace::Blogs,
                &query.filter,
                query.page.window(),
                Some(&newest_first()),
                Some(query.locale.as_str()),
            )
            .map_err(|err| warn!(error = %err, "Blog listing key unavailable; bypassing cache"))
            .ok();

        self.cache
            .read_through
            .fetch(key.as_ref(), || self.load_blogs(scope, &query))
            .await
    }

    async fn load_blogs(
        &self,
        scope: CacheScope,
        query: &BlogListQuery,
    ) -> Result<ListEnvelope<BlogSummary>, AppError> {
        let empty = || ListEnvelope::from_page(Page::from_sorted(Vec::new(), query.page));
        let mut filter = BlogQueryFilter {
            search: query
                .filter
                .search
                .as_deref()
                .map(str::trim)
                .filter(|search| !search.is_empty())
                .map(str::to_string),
            ..Default::default()
        };
        if let Some(slug) = query.filter.product.as_deref() {
            match self.origin(self.products.find_product_by_slug(slug)).await? {
                Some(product) => filter.product_id = Some(product.id),
                None => return Ok(empty()),
            }
        }
        if let Some(slug) = query.filter.category.as_deref() {
            match self
                .origin(self.taxonomy.find_term_by_slug(TaxonomyKind::Category, slug))
                .await?
            {
                Some(term) => filter.category_id = Some(term.id),
                None => return Ok(empty()),
            }
        }

        let list_scope = match scope {
            CacheScope::Public => ListScope::Public,
            CacheScope::Admin => ListScope::Admin {
                status: query.filter.status,
            },
        };
        let page = self
            .origin(self.blogs.list_blogs(list_scope, &filter, query.page))
            .await?;

        let primaries: Vec<Uuid> = page
            .items
            .iter()
            .filter_map(|blog| blog.primary_product)
            .collect();
        let products = self.visible_products(scope, &primaries).await?;

        Ok(ListEnvelope::from_page(page.map(|blog| {
            summarize(&blog, &products, &query.locale)
        })))
    }

    #[instrument(skip_all, fields(scope = scope.as_str(), slug = slug))]
    pub async fn get_blog(
        &self,
        scope: CacheScope,
        slug: &str,
        locale: &Locale,
    ) -> Result<Lookup<ItemEnvelope<BlogDetail>>, AppError> {
        let key = self.cache.keys.detail(
            scope,
            Namespace::Blog,
            DetailIdent::Slug(slug.to_string()),
            Some(locale.as_str()),
        );
        self.cache
            .read_through
            .fetch(Some(&key), || self.load_blog(scope, slug, locale))
            .await
    }

    async fn load_blog(
        &self,
        scope: CacheScope,
        slug: &str,
        locale: &Locale,
    ) -> Result<ItemEnvelope<BlogDetail>, AppError> {
        let blog = self
            .origin(self.blogs.find_blog_by_slug(slug))
            .await?
            .filter(|blog| scope == CacheScope::Admin || blog.status.is_public())
            .ok_or(AppError::NotFound)?;

        let referenced = blog.referenced_products();
        let products = self.visible_products(scope, &referenced).await?;
        let snippets = referenced
            .iter()
            .filter_map(|id| products.get(id))
            .map(|product| ProductSnippet::from_record(product, locale))
            .collect();

        Ok(ItemEnvelope::new(BlogDetail {
            summary: summarize(&blog, &products, locale),
            body: blog.body.resolve(locale).to_string(),
            products: snippets,
        }))
    }

    /// Products by id, restricted to published ones for public scope.
    async fn visible_products(
        &self,
        scope: CacheScope,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, ProductRecord>, AppError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .origin(self.products.find_products_by_ids(ids))
            .await?
            .into_iter()
            .filter(|product| scope == CacheScope::Admin || product.status.is_public())
            .map(|product| (product.id, product))
            .collect())
    }

    #[instrument(skip(self, input))]
    pub async fn create_blog(&self, input: BlogInput) -> Result<BlogRecord, AppError> {
        let title = self.validate(&input).await?;
        let slug = match input.slug.as_deref() {
            Some(slug) => {
                let slug = validate_slug(slug)
                    .map_err(|err| AppError::validation(err.to_string()))?
                    .to_string();
                self.ensure_slug_free(&slug, None).await?;
                slug
            }
            None => self.derive_slug(&title).await?,
        };

        let mut referenced: Vec<Uuid> = input.primary_product.into_iter().collect();
        for product in &input.related_products {
            if !referenced.contains(product) {
                referenced.push(*product);
            }
        }
        let relations = self.product_refs(&referenced).await;
        let record = self
            .origin(self.writer.create_blog(CreateBlogParams {
                slug,
                title,
                body: input.body.normalized()?,
                status: input.status,
                category_id: input.category_id,
                primary_product: input.primary_product,
                related_products: input.related_products,
            }))
            .await?;

        info!(blog_id = %record.id, slug = %record.slug, "Blog created");
        self.invalidate_with_products(
            Mutation::new(EntityKind::Blog, MutationKind::Created, record.id)
                .with_slug(&record.slug),
            relations,
        )
        .await;
        Ok(record)
    }

    #[instrument(skip(self, input))]
    pub async fn update_blog(&self, id: Uuid, input: BlogInput) -> Result<BlogRecord, AppError> {
        let existing = self
            .origin(self.blogs.find_blog_by_id(id))
            .await?
            .ok_or(AppError::NotFound)?;
        let title = self.validate(&input).await?;
        let slug = match input.slug.as_deref() {
            Some(slug) => validate_slug(slug)
                .map_err(|err| AppError::validation(err.to_string()))?
                .to_string(),
            None => existing.slug.clone(),
        };
        self.ensure_slug_free(&slug, Some(id)).await?;

        // Products that lose the blog and products that gain it both change.
        let mut affected = existing.referenced_products();
        for product in input.primary_product.iter().chain(&input.related_products) {
            if !affected.contains(product) {
                affected.push(*product);
            }
        }
        let relations = self.product_refs(&affected).await;

        let record = self
            .origin(self.writer.update_blog(UpdateBlogParams {
                id,
                slug,
                title,
                body: input.body.normalized()?,
                status: input.status,
                category_id: input.category_id,
                primary_product: input.primary_product,
                related_products: input.related_products,
            }))
            .await?;

        info!(blog_id = %id, slug = %record.slug, "Blog updated");
        self.invalidate_with_products(
            Mutation::new(EntityKind::Blog, MutationKind::Updated, id)
                .with_slug(&existing.slug)
                .with_slug(&record.slug),
            relations,
        )
        .await;
        Ok(record)
    }

    #[instrument(skip(self))]
    pub async fn delete_blog(&self, id: Uuid) -> Result<BlogRecord, AppError> {
        let existing = self
            .origin(self.blogs.find_blog_by_id(id))
            .await?
            .ok_or(AppError::NotFound)?;
        let relations = self.product_refs(&existing.referenced_products()).await;
        let record = self.origin(self.writer.delete_blog(id)).await?;

        info!(blog_id = %id, slug = %record.slug, "Blog deleted");
        self.invalidate_with_products(
            Mutation::new(EntityKind::Blog, MutationKind::Deleted, id).with_slug(&record.slug),
            relations,
        )
        .await;
        Ok(record)
    }

    /// Product references carrying current slugs; ids without a record keep only the id.
    /// `None` when the lookup failed.
    async fn product_refs(&self, ids: &[Uuid]) -> Option<Vec<EntityRef>> {
        if ids.is_empty() {
            return Some(Vec::new());
        }
        let slugs: HashMap<Uuid, String> =
            match self.origin(self.products.find_products_by_ids(ids)).await {
                Ok(products) => products
                    .into_iter()
                    .map(|product| (product.id, product.slug))
                    .collect(),
                Err(err) => {
                    warn!(
                        products = ids.len(),
                        error = %err,
                        "Referenced products lookup failed; product caches will be purged whole"
                    );
                    return None;
                }
            };

        Some(
            ids.iter()
                .map(|id| {
                    let reference = EntityRef::new(EntityKind::Product, id);
                    match slugs.get(id) {
                        Some(slug) => reference.with_slug(slug),
                        None => reference,
                    }
                })
                .collect(),
        )
    }

    /// Runs the mutation's rules. Without resolved slugs the product detail
    /// namespace is purged instead.
    async fn invalidate_with_products(
        &self,
        mutation: Mutation,
        relations: Option<Vec<EntityRef>>,
    ) {
        let invalidator = &self.cache.invalidator;
        match relations {
            Some(relations) => {
                invalidator.invalidate(&mutation.with_relations(relations)).await;
            }
            None => {
                invalidator.invalidate(&mutation).await;
                invalidator.purge_namespace(Namespace::Product).await;
            }
        }
    }

    async fn validate(&self, input: &BlogInput) -> Result<LocalizedText, AppError> {
        let title = input.title.clone().normalized()?;
        if title.is_blank() {
            return Err(AppError::validation("blog title must not be empty"));
        }

        if let Some(category_id) = input.category_id
            && self
                .origin(
                    self.taxonomy
                        .find_term_by_id(TaxonomyKind::Category, category_id),
                )
                .await?
                .is_none()
        {
            return Err(AppError::validation(format!(
                "unknown category `{category_id}`"
            )));
        }

        let mut referenced: Vec<Uuid> = input.primary_product.into_iter().collect();
        referenced.extend(input.related_products.iter().copied());
        referenced.sort();
        referenced.dedup();
        if !referenced.is_empty() {
            let found = self
                .origin(self.products.find_products_by_ids(&referenced))
                .await?;
            if let Some(missing) = referenced
                .iter()
                .find(|id| !found.iter().any(|product| product.id == **id))
            {
                return Err(AppError::validation(format!("unknown product `{missing}`")));
            }
        }
        Ok(title)
    }

    async fn ensure_slug_free(&self, slug: &str, owner: Option<Uuid>) -> Result<(), AppError> {
        match self.origin(self.blogs.find_blog_by_slug(slug)).await? {
            Some(existing) if Some(existing.id) != owner => Err(AppError::conflict(format!(
                "blog slug `{slug}` is already taken"
            ))),
            _ => Ok(()),
        }
    }

    async fn derive_slug(&self, title: &LocalizedText) -> Result<String, AppError> {
        let source = title.resolve(&Locale::default_locale()).to_string();
        let blogs = Arc::clone(&self.blogs);
        let limit = self.origin_timeout;
        generate_unique_slug_async(&source, move |candidate| {
            let blogs = Arc::clone(&blogs);
            async move {
                with_timeout(limit, blogs.find_blog_by_slug(&candidate))
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

fn summarize(
    blog: &BlogRecord,
    products: &HashMap<Uuid, ProductRecord>,
    locale: &Locale,
) -> BlogSummary {
    BlogSummary {
        id: blog.id,
        slug: blog.slug.clone(),
        title: blog.title.resolve(locale).to_string(),
        status: blog.status,
        category_id: blog.category_id,
        primary_product: blog
            .primary_product
            .and_then(|id| products.get(&id))
            .map(|product| ProductSnippet::from_record(product, locale)),
        updated_at: format_timestamp(blog.updated_at),
    }
}
