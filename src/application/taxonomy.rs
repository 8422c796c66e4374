//! Categories and brands: cached reference data and term writes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{
    BlogsRepo, CreateTermParams, ProductsRepo, RepoError, TaxonomyRepo, TaxonomyWriteRepo,
    UpdateTermParams, with_timeout,
};
use crate::application::views::{CategoryNode, ItemEnvelope, ListEnvelope, TermView};
use crate::cache::{
    CacheScope, CacheState, DetailIdent, EntityKind, Lookup, Mutation, MutationKind, Namespace,
    SortDirection, SortKey,
};
use crate::domain::entities::{LocalizedText, TaxonomyRecord};
use crate::domain::error::DomainError;
use crate::domain::slug::{derive_slug, validate_slug};
use crate::domain::types::{Locale, TaxonomyKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermFilter {
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermListQuery {
    pub filter: TermFilter,
    pub page: PageRequest,
    pub locale: Locale,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TermInput {
    pub slug: Option<String>,
    pub name: LocalizedText,
    pub parent_id: Option<Uuid>,
}

pub fn listing_namespace(kind: TaxonomyKind) -> Namespace {
    match kind {
        TaxonomyKind::Category => Namespace::Categories,
        TaxonomyKind::Brand => Namespace::Brands,
    }
}

pub fn detail_namespace(kind: TaxonomyKind) -> Namespace {
    match kind {
        TaxonomyKind::Category => Namespace::Category,
        TaxonomyKind::Brand => Namespace::Brand,
    }
}

fn entity_kind(kind: TaxonomyKind) -> EntityKind {
    match kind {
        TaxonomyKind::Category => EntityKind::Category,
        TaxonomyKind::Brand => EntityKind::Brand,
    }
}

pub struct TaxonomyService {
    terms: Arc<dyn TaxonomyRepo>,
    writer: Arc<dyn TaxonomyWriteRepo>,
    products: Arc<dyn ProductsRepo>,
    blogs: Arc<dyn BlogsRepo>,
    cache: CacheState,
    origin_timeout: Duration,
}

impl TaxonomyService {
    pub fn new(
        terms: Arc<dyn TaxonomyRepo>,
        writer: Arc<dyn TaxonomyWriteRepo>,
        products: Arc<dyn ProductsRepo>,
        blogs: Arc<dyn BlogsRepo>,
        cache: CacheState,
        origin_timeout: Duration,
    ) -> Self {
        Self {
            terms,
            writer,
            products,
            blogs,
            cache,
            origin_timeout,
        }
    }

    #[instrument(skip_all, fields(kind = kind.as_str(), page = query.page.page()))]
    pub async fn list_terms(
        &self,
        kind: TaxonomyKind,
        query: &TermListQuery,
    ) -> Result<Lookup<ListEnvelope<TermView>>, AppError> {
        let key = self
            .cache
            .keys
            .listing(
                CacheScope::Public,
                listing_namespace(kind),
                &query.filter,
                query.page.window(),
                Some(&SortKey::new("slug", SortDirection::Asc)),
                Some(query.locale.as_str()),
            )
            .map_err(|err| warn!(error = %err, "Term listing key unavailable; bypassing cache"))
            .ok();

        self.cache
            .read_through
            .fetch(key.as_ref(), || async {
                let mut terms = self.origin(self.terms.list_terms(kind)).await?;
                if let Some(search) = query
                    .filter
                    .search
                    .as_deref()
                    .map(str::trim)
                    .filter(|search| !search.is_empty())
                {
                    terms.retain(|term| term.slug.contains(search) || term.name.contains(search));
                }
                terms.sort_by(|a, b| a.slug.cmp(&b.slug));
                let page = Page::from_sorted(terms, query.page);
                Ok::<_, AppError>(ListEnvelope::from_page(
                    page.map(|term| TermView::from_record(&term, &query.locale)),
                ))
            })
            .await
    }

    #[instrument(skip_all, fields(locale = locale.as_str()))]
    pub async fn category_tree(
        &self,
        locale: &Locale,
    ) -> Result<Lookup<ItemEnvelope<Vec<CategoryNode>>>, AppError> {
        let key = self.cache.keys.detail(
            CacheScope::Public,
            Namespace::CategoryTree,
            DetailIdent::Id("root".to_string()),
            Some(locale.as_str()),
        );
        self.cache
            .read_through
            .fetch(Some(&key), || async {
                let terms = self
                    .origin(self.terms.list_terms(TaxonomyKind::Category))
                    .await?;
                Ok::<_, AppError>(ItemEnvelope::new(build_tree(&terms, locale)))
            })
            .await
    }

    #[instrument(skip_all, fields(kind = kind.as_str(), slug = slug))]
    pub async fn get_term(
        &self,
        kind: TaxonomyKind,
        slug: &str,
        locale: &Locale,
    ) -> Result<Lookup<ItemEnvelope<TermView>>, AppError> {
        let key = self.cache.keys.detail(
            CacheScope::Public,
            detail_namespace(kind),
            DetailIdent::Slug(slug.to_string()),
            Some(locale.as_str()),
        );
        self.cache
            .read_through
            .fetch(Some(&key), || async {
                let term = self
                    .origin(self.terms.find_term_by_slug(kind, slug))
                    .await?
                    .ok_or(AppError::NotFound)?;
                Ok::<_, AppError>(ItemEnvelope::new(TermView::from_record(&term, locale)))
            })
            .await
    }

    #[instrument(skip(self, input), fields(kind = kind.as_str()))]
    pub async fn create_term(
        &self,
        kind: TaxonomyKind,
        input: TermInput,
    ) -> Result<TaxonomyRecord, AppError> {
        let name = self.validate(kind, None, &input).await?;
        let slug = match input.slug.as_deref() {
            Some(slug) => validate_slug(slug)
                .map_err(|err| AppError::validation(err.to_string()))?
                .to_string(),
            None => derive_slug(name.resolve(&Locale::default_locale()))
                .map_err(|err| AppError::validation(err.to_string()))?,
        };
        self.ensure_slug_free(kind, &slug, None).await?;

        let record = self
            .origin(self.writer.create_term(CreateTermParams {
                kind,
                slug,
                name,
                parent_id: input.parent_id,
            }))
            .await?;

        info!(term_id = %record.id, slug = %record.slug, "Term created");
        self.cache
            .invalidator
            .invalidate(
                &Mutation::new(entity_kind(kind), MutationKind::Created, record.id)
                    .with_slug(&record.slug),
            )
            .await;
        Ok(record)
    }

    #[instrument(skip(self, input), fields(kind = kind.as_str()))]
    pub async fn update_term(
        &self,
        kind: TaxonomyKind,
        id: Uuid,
        input: TermInput,
    ) -> Result<TaxonomyRecord, AppError> {
        let existing = self
            .origin(self.terms.find_term_by_id(kind, id))
            .await?
            .ok_or(AppError::NotFound)?;
        let name = self.validate(kind, Some(id), &input).await?;
        let slug = match input.slug.as_deref() {
            Some(slug) => validate_slug(slug)
                .map_err(|err| AppError::validation(err.to_string()))?
                .to_string(),
            None => existing.slug.clone(),
        };
        self.ensure_slug_free(kind, &slug, Some(id)).await?;

        let record = self
            .origin(self.writer.update_term(UpdateTermParams {
                id,
                kind,
                slug,
                name,
                parent_id: input.parent_id,
            }))
            .await?;

        info!(term_id = %id, slug = %record.slug, "Term updated");
        self.cache
            .invalidator
            .invalidate(
                &Mutation::new(entity_kind(kind), MutationKind::Updated, id)
                    .with_slug(&existing.slug)
                    .with_slug(&record.slug),
            )
            .await;
        Ok(record)
    }

    /// Deletes a term nothing references anymore.
    #[instrument(skip(self), fields(kind = kind.as_str()))]
    pub async fn delete_term(
        &self,
        kind: TaxonomyKind,
        id: Uuid,
    ) -> Result<TaxonomyRecord, AppError> {
        let existing = self
            .origin(self.terms.find_term_by_id(kind, id))
            .await?
            .ok_or(AppError::NotFound)?;

        let products = self
            .origin(self.products.count_products_in_term(kind, id))
            .await?;
        let blogs = match kind {
            TaxonomyKind::Category => self.origin(self.blogs.count_blogs_in_category(id)).await?,
            TaxonomyKind::Brand => 0,
        };
        let children = match kind {
            TaxonomyKind::Category => self
                .origin(self.terms.list_terms(kind))
                .await?
                .iter()
                .filter(|term| term.parent_id == Some(id))
                .count(),
            TaxonomyKind::Brand => 0,
        };
        if products > 0 || blogs > 0 || children > 0 {
            return Err(DomainError::in_use(
                kind.as_str(),
                format!("{products} product(s), {blogs} blog(s), {children} child categories"),
            )
            .into());
        }

        let record = self.origin(self.writer.delete_term(kind, id)).await?;
        info!(term_id = %id, slug = %existing.slug, "Term deleted");
        self.cache
            .invalidator
            .invalidate(
                &Mutation::new(entity_kind(kind), MutationKind::Deleted, id)
                    .with_slug(&record.slug),
            )
            .await;
        Ok(record)
    }

    async fn validate(
        &self,
        kind: TaxonomyKind,
        id: Option<Uuid>,
        input: &TermInput,
    ) -> Result<LocalizedText, AppError> {
        let name = input.name.clone().normalized()?;
        if name.is_blank() {
            return Err(AppError::validation("term name must not be empty"));
        }

        let Some(parent_id) = input.parent_id else {
            return Ok(name);
        };
        if kind == TaxonomyKind::Brand {
            return Err(AppError::validation("brands cannot have a parent"));
        }

        let categories = self.origin(self.terms.list_terms(kind)).await?;
        let parents: HashMap<Uuid, Option<Uuid>> = categories
            .iter()
            .map(|term| (term.id, term.parent_id))
            .collect();
        if !parents.contains_key(&parent_id) {
            return Err(AppError::validation(format!(
                "unknown parent category `{parent_id}`"
            )));
        }

        // Walk up from the new parent; meeting the term itself means a cycle.
        if let Some(id) = id {
            let mut cursor = Some(parent_id);
            let mut seen = HashSet::new();
            while let Some(current) = cursor {
                if current == id {
                    return Err(AppError::validation(
                        "category cannot be nested under itself",
                    ));
                }
                if !seen.insert(current) {
                    break;
                }
                cursor = parents.get(&current).copied().flatten();
            }
        }
        Ok(name)
    }

    async fn ensure_slug_free(
        &self,
        kind: TaxonomyKind,
        slug: &str,
        owner: Option<Uuid>,
    ) -> Result<(), AppError> {
        match self.origin(self.terms.find_term_by_slug(kind, slug)).await? {
            Some(existing) if Some(existing.id) != owner => Err(AppError::conflict(format!(
                "{} slug `{slug}` is already taken",
                kind.as_str()
            ))),
            _ => Ok(()),
        }
    }

    async fn origin<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, RepoError>>,
    ) -> Result<T, RepoError> {
        with_timeout(self.origin_timeout, fut).await
    }
}

/// Nests categories under their parents, children ordered by slug.
///
/// Terms whose parent is missing become roots; a term is placed at most once.
pub fn build_tree(terms: &[TaxonomyRecord], locale: &Locale) -> Vec<CategoryNode> {
    let ids: HashSet<Uuid> = terms.iter().map(|term| term.id).collect();
    let mut children: HashMap<Option<Uuid>, Vec<&TaxonomyRecord>> = HashMap::new();
    for term in terms {
        let parent = term.parent_id.filter(|parent| ids.contains(parent));
        children.entry(parent).or_default().push(term);
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| a.slug.cmp(&b.slug));
    }

    fn attach(
        parent: Option<Uuid>,
        children: &HashMap<Option<Uuid>, Vec<&TaxonomyRecord>>,
        placed: &mut HashSet<Uuid>,
        locale: &Locale,
    ) -> Vec<CategoryNode> {
        let Some(siblings) = children.get(&parent) else {
            return Vec::new();
        };
        let mut nodes = Vec::with_capacity(siblings.len());
        for term in siblings {
            if !placed.insert(term.id) {
                continue;
            }
            nodes.push(CategoryNode {
                id: term.id,
                slug: term.slug.clone(),
                name: term.name.resolve(locale).to_string(),
                children: attach(Some(term.id), children, placed, locale),
            });
        }
        nodes
    }

    let mut placed = HashSet::new();
    attach(None, &children, &mut placed, locale)
}
