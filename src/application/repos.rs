//! Repository traits describing the catalog origin.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::{Page, PageRequest};
use crate::domain::entities::{
    BlogRecord, CartRecord, LocalizedText, ProductRecord, Promotion, TaxonomyRecord,
};
use crate::domain::types::{PublicationStatus, TaxonomyKind};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("origin query timed out")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn duplicate(constraint: impl Into<String>) -> Self {
        Self::Duplicate {
            constraint: constraint.into(),
        }
    }
}

/// Bounds an origin call by `limit`, mapping expiry to [`RepoError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, RepoError>
where
    F: Future<Output = Result<T, RepoError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| RepoError::Timeout)?
}

/// Which records a listing may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    Public,
    Admin { status: Option<PublicationStatus> },
}

impl ListScope {
    pub fn admits(self, status: PublicationStatus) -> bool {
        match self {
            ListScope::Public => status.is_public(),
            ListScope::Admin { status: None } => true,
            ListScope::Admin {
                status: Some(wanted),
            } => wanted == status,
        }
    }
}

/// Origin-side product filter; taxonomy slugs are already resolved to ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductQueryFilter {
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub search: Option<String>,
    pub min_price_cents: Option<u64>,
    pub max_price_cents: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProductOrder {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlogQueryFilter {
    pub product_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateProductParams {
    pub slug: String,
    pub name: LocalizedText,
    pub description: LocalizedText,
    pub price_cents: u64,
    pub currency: String,
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub status: PublicationStatus,
}

#[derive(Debug, Clone)]
pub struct UpdateProductParams {
    pub id: Uuid,
    pub slug: String,
    pub name: LocalizedText,
    pub description: LocalizedText,
    pub price_cents: u64,
    pub currency: String,
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub status: PublicationStatus,
}

#[derive(Debug, Clone)]
pub struct CreateBlogParams {
    pub slug: String,
    pub title: LocalizedText,
    pub body: LocalizedText,
    pub status: PublicationStatus,
    pub category_id: Option<Uuid>,
    pub primary_product: Option<Uuid>,
    pub related_products: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct UpdateBlogParams {
    pub id: Uuid,
    pub slug: String,
    pub title: LocalizedText,
    pub body: LocalizedText,
    pub status: PublicationStatus,
    pub category_id: Option<Uuid>,
    pub primary_product: Option<Uuid>,
    pub related_products: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct CreateTermParams {
    pub kind: TaxonomyKind,
    pub slug: String,
    pub name: LocalizedText,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct UpdateTermParams {
    pub id: Uuid,
    pub kind: TaxonomyKind,
    pub slug: String,
    pub name: LocalizedText,
    pub parent_id: Option<Uuid>,
}

#[async_trait]
pub trait ProductsRepo: Send + Sync {
    async fn list_products(
        &self,
        scope: ListScope,
        filter: &ProductQueryFilter,
        order: ProductOrder,
        page: PageRequest,
    ) -> Result<Page<ProductRecord>, RepoError>;

    async fn find_product_by_slug(&self, slug: &str) -> Result<Option<ProductRecord>, RepoError>;

    async fn find_product_by_id(&self, id: Uuid) -> Result<Option<ProductRecord>, RepoError>;

    /// Records for `ids`, in the order given; unknown ids are skipped.
    async fn find_products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<ProductRecord>, RepoError>;

    async fn count_products_in_term(
        &self,
        kind: TaxonomyKind,
        term_id: Uuid,
    ) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait ProductsWriteRepo: Send + Sync {
    async fn create_product(&self, params: CreateProductParams)
    -> Result<ProductRecord, RepoError>;

    async fn update_product(&self, params: UpdateProductParams)
    -> Result<ProductRecord, RepoError>;

    async fn delete_product(&self, id: Uuid) -> Result<ProductRecord, RepoError>;

    async fn set_promotion(
        &self,
        id: Uuid,
        promotion: Option<Promotion>,
    ) -> Result<ProductRecord, RepoError>;
}

#[async_trait]
pub trait BlogsRepo: Send + Sync {
    async fn list_blogs(
        &self,
        scope: ListScope,
        filter: &BlogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<BlogRecord>, RepoError>;

    async fn find_blog_by_slug(&self, slug: &str) -> Result<Option<BlogRecord>, RepoError>;

    async fn find_blog_by_id(&self, id: Uuid) -> Result<Option<BlogRecord>, RepoError>;

    /// Blogs of any status whose primary or related products include `product_id`.
    async fn list_blogs_referencing_product(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<BlogRecord>, RepoError>;

    async fn count_blogs_in_category(&self, category_id: Uuid) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait BlogsWriteRepo: Send + Sync {
    async fn create_blog(&self, params: CreateBlogParams) -> Result<BlogRecord, RepoError>;

    async fn update_blog(&self, params: UpdateBlogParams) -> Result<BlogRecord, RepoError>;

    async fn delete_blog(&self, id: Uuid) -> Result<BlogRecord, RepoError>;
}

#[async_trait]
pub trait TaxonomyRepo: Send + Sync {
    async fn list_terms(&self, kind: TaxonomyKind) -> Result<Vec<TaxonomyRecord>, RepoError>;

    async fn find_term_by_slug(
        &self,
        kind: TaxonomyKind,
        slug: &str,
    ) -> Result<Option<TaxonomyRecord>, RepoError>;

    async fn find_term_by_id(
        &self,
        kind: TaxonomyKind,
        id: Uuid,
    ) -> Result<Option<TaxonomyRecord>, RepoError>;
}

#[async_trait]
pub trait TaxonomyWriteRepo: Send + Sync {
    async fn create_term(&self, params: CreateTermParams) -> Result<TaxonomyRecord, RepoError>;

    async fn update_term(&self, params: UpdateTermParams) -> Result<TaxonomyRecord, RepoError>;

    async fn delete_term(&self, kind: TaxonomyKind, id: Uuid)
    -> Result<TaxonomyRecord, RepoError>;
}

#[async_trait]
pub trait CartRepo: Send + Sync {
    async fn load_cart(&self, session_id: &str) -> Result<Option<CartRecord>, RepoError>;

    async fn save_cart(&self, cart: CartRecord) -> Result<(), RepoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_scope_only_admits_published() {
        assert!(ListScope::Public.admits(PublicationStatus::Published));
        assert!(!ListScope::Public.admits(PublicationStatus::Draft));
        assert!(ListScope::Admin { status: None }.admits(PublicationStatus::Archived));
        assert!(
            !ListScope::Admin {
                status: Some(PublicationStatus::Draft)
            }
            .admits(PublicationStatus::Published)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_origin_times_out() {
        let result: Result<(), RepoError> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(RepoError::Timeout)));
    }
}
