//! In-memory document repositories backing the catalog origin.
//!
//! One shared [`InMemoryRepositories`] implements every repository trait,
//! the way a single connection pool would.

mod blogs;
mod carts;
mod products;
mod taxonomy;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::domain::entities::{
    BlogRecord, CartRecord, LocalizedText, ProductRecord, TaxonomyRecord,
};

#[derive(Debug, Default)]
struct CatalogData {
    products: HashMap<Uuid, ProductRecord>,
    blogs: HashMap<Uuid, BlogRecord>,
    terms: HashMap<Uuid, TaxonomyRecord>,
    carts: HashMap<String, CartRecord>,
}

#[derive(Clone, Default)]
pub struct InMemoryRepositories {
    data: Arc<RwLock<CatalogData>>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a fully built record, enforcing slug uniqueness.
    pub async fn insert_product(&self, record: ProductRecord) -> Result<(), RepoError> {
        let mut data = self.data.write().await;
        if data
            .products
            .values()
            .any(|existing| existing.slug == record.slug && existing.id != record.id)
        {
            return Err(RepoError::duplicate("products_slug_key"));
        }
        data.products.insert(record.id, record);
        Ok(())
    }

    pub async fn insert_blog(&self, record: BlogRecord) -> Result<(), RepoError> {
        let mut data = self.data.write().await;
        if data
            .blogs
            .values()
            .any(|existing| existing.slug == record.slug && existing.id != record.id)
        {
            return Err(RepoError::duplicate("blogs_slug_key"));
        }
        data.blogs.insert(record.id, record);
        Ok(())
    }

    pub async fn insert_term(&self, record: TaxonomyRecord) -> Result<(), RepoError> {
        let mut data = self.data.write().await;
        if data.terms.values().any(|existing| {
            existing.kind == record.kind && existing.slug == record.slug && existing.id != record.id
        }) {
            return Err(RepoError::duplicate("taxonomy_kind_slug_key"));
        }
        data.terms.insert(record.id, record);
        Ok(())
    }

    /// Counts of stored products, blogs and terms.
    pub async fn counts(&self) -> (usize, usize, usize) {
        let data = self.data.read().await;
        (data.products.len(), data.blogs.len(), data.terms.len())
    }
}

fn convert_count(value: usize) -> Result<u64, RepoError> {
    value
        .try_into()
        .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
}

fn matches_search(needle: Option<&str>, slug: &str, text: &LocalizedText) -> bool {
    match needle {
        Some(needle) => slug.contains(&needle.to_lowercase()) || text.contains(needle),
        None => true,
    }
}
