use std::cmp::Ordering;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{Page, PageRequest},
    application::repos::{
        CreateProductParams, ListScope, ProductOrder, ProductQueryFilter, ProductsRepo,
        ProductsWriteRepo, RepoError, UpdateProductParams,
    },
    domain::entities::{ProductRecord, Promotion},
    domain::types::{Locale, TaxonomyKind},
};

use super::{InMemoryRepositories, convert_count, matches_search};

fn compare(order: ProductOrder, left: &ProductRecord, right: &ProductRecord) -> Ordering {
    let primary = match order {
        ProductOrder::Newest => right.created_at.cmp(&left.created_at),
        ProductOrder::PriceAsc => left
            .effective_price_cents()
            .cmp(&right.effective_price_cents()),
        ProductOrder::PriceDesc => right
            .effective_price_cents()
            .cmp(&left.effective_price_cents()),
        ProductOrder::Name => {
            let locale = Locale::default_locale();
            left.name
                .resolve(&locale)
                .to_lowercase()
                .cmp(&right.name.resolve(&locale).to_lowercase())
        }
    };
    primary.then_with(|| left.slug.cmp(&right.slug))
}

fn admits(filter: &ProductQueryFilter, record: &ProductRecord) -> bool {
    let price = record.effective_price_cents();
    filter
        .category_id
        .is_none_or(|id| record.category_id == Some(id))
        && filter.brand_id.is_none_or(|id| record.brand_id == Some(id))
        && filter.min_price_cents.is_none_or(|min| price >= min)
        && filter.max_price_cents.is_none_or(|max| price <= max)
        && matches_search(filter.search.as_deref(), &record.slug, &record.name)
}

#[async_trait]
impl ProductsRepo for InMemoryRepositories {
    async fn list_products(
        &self,
        scope: ListScope,
        filter: &ProductQueryFilter,
        order: ProductOrder,
        page: PageRequest,
    ) -> Result<Page<ProductRecord>, RepoError> {
        let data = self.data.read().await;
        let mut rows: Vec<ProductRecord> = data
            .products
            .values()
            .filter(|record| scope.admits(record.status) && admits(filter, record))
            .cloned()
            .collect();
        rows.sort_by(|left, right| compare(order, left, right));
        Ok(Page::from_sorted(rows, page))
    }

    async fn find_product_by_slug(&self, slug: &str) -> Result<Option<ProductRecord>, RepoError> {
        let data = self.data.read().await;
        Ok(data
            .products
            .values()
            .find(|record| record.slug == slug)
            .cloned())
    }

    async fn find_product_by_id(&self, id: Uuid) -> Result<Option<ProductRecord>, RepoError> {
        Ok(self.data.read().await.products.get(&id).cloned())
    }

    async fn find_products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<ProductRecord>, RepoError> {
        let data = self.data.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| data.products.get(id).cloned())
            .collect())
    }

    async fn count_products_in_term(
        &self,
        kind: TaxonomyKind,
        term_id: Uuid,
    ) -> Result<u64, RepoError> {
        let data = self.data.read().await;
        let count = data
            .products
            .values()
            .filter(|record| match kind {
                TaxonomyKind::Category => record.category_id == Some(term_id),
                TaxonomyKind::Brand => record.brand_id == Some(term_id),
            })
            .count();
        convert_count(count)
    }
}

#[async_trait]
impl ProductsWriteRepo for InMemoryRepositories {
    async fn create_product(
        &self,
        params: CreateProductParams,
    ) -> Result<ProductRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let record = ProductRecord {
            id: Uuid::new_v4(),
            slug: params.slug,
            name: params.name,
            description: params.description,
            price_cents: params.price_cents,
            currency: params.currency,
            category_id: params.category_id,
            brand_id: params.brand_id,
            status: params.status,
            promotion: None,
            created_at: now,
            updated_at: now,
        };
        self.insert_product(record.clone()).await?;
        Ok(record)
    }

    async fn update_product(
        &self,
        params: UpdateProductParams,
    ) -> Result<ProductRecord, RepoError> {
        let mut data = self.data.write().await;
        if data
            .products
            .values()
            .any(|existing| existing.slug == params.slug && existing.id != params.id)
        {
            return Err(RepoError::duplicate("products_slug_key"));
        }

        let record = data.products.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        record.slug = params.slug;
        record.name = params.name;
        record.description = params.description;
        record.price_cents = params.price_cents;
        record.currency = params.currency;
        record.category_id = params.category_id;
        record.brand_id = params.brand_id;
        record.status = params.status;
        record.updated_at = OffsetDateTime::now_utc();
        Ok(record.clone())
    }

    async fn delete_product(&self, id: Uuid) -> Result<ProductRecord, RepoError> {
        self.data
            .write()
            .await
            .products
            .remove(&id)
            .ok_or(RepoError::NotFound)
    }

    async fn set_promotion(
        &self,
        id: Uuid,
        promotion: Option<Promotion>,
    ) -> Result<ProductRecord, RepoError> {
        let mut data = self.data.write().await;
        let record = data.products.get_mut(&id).ok_or(RepoError::NotFound)?;
        record.promotion = promotion;
        record.updated_at = OffsetDateTime::now_utc();
        Ok(record.clone())
    }
}
