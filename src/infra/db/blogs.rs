use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{Page, PageRequest},
    application::repos::{
        BlogQueryFilter, BlogsRepo, BlogsWriteRepo, CreateBlogParams, ListScope, RepoError,
        UpdateBlogParams,
    },
    domain::entities::BlogRecord,
};

use super::{InMemoryRepositories, convert_count, matches_search};

fn admits(filter: &BlogQueryFilter, record: &BlogRecord) -> bool {
    filter
        .product_id
        .is_none_or(|id| record.references_product(id))
        && filter
            .category_id
            .is_none_or(|id| record.category_id == Some(id))
        && matches_search(filter.search.as_deref(), &record.slug, &record.title)
}

#[async_trait]
impl BlogsRepo for InMemoryRepositories {
    async fn list_blogs(
        &self,
        scope: ListScope,
        filter: &BlogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<BlogRecord>, RepoError> {
        let data = self.data.read().await;
        let mut rows: Vec<BlogRecord> = data
            .blogs
            .values()
            .filter(|record| scope.admits(record.status) && admits(filter, record))
            .cloned()
            .collect();
        rows.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| left.slug.cmp(&right.slug))
        });
        Ok(Page::from_sorted(rows, page))
    }

    async fn find_blog_by_slug(&self, slug: &str) -> Result<Option<BlogRecord>, RepoError> {
        let data = self.data.read().await;
        Ok(data.blogs.values().find(|record| record.slug == slug).cloned())
    }

    async fn find_blog_by_id(&self, id: Uuid) -> Result<Option<BlogRecord>, RepoError> {
        Ok(self.data.read().await.blogs.get(&id).cloned())
    }

    async fn list_blogs_referencing_product(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<BlogRecord>, RepoError> {
        let data = self.data.read().await;
        Ok(data
            .blogs
            .values()
            .filter(|record| record.references_product(product_id))
            .cloned()
            .collect())
    }

    async fn count_blogs_in_category(&self, category_id: Uuid) -> Result<u64, RepoError> {
        let data = self.data.read().await;
        convert_count(
            data.blogs
                .values()
                .filter(|record| record.category_id == Some(category_id))
                .count(),
        )
    }
}

#[async_trait]
impl BlogsWriteRepo for InMemoryRepositories {
    async fn create_blog(&self, params: CreateBlogParams) -> Result<BlogRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let record = BlogRecord {
            id: Uuid::new_v4(),
            slug: params.slug,
            title: params.title,
            body: params.body,
            status: params.status,
            category_id: params.category_id,
            primary_product: params.primary_product,
            related_products: params.related_products,
            created_at: now,
            updated_at: now,
        };
        self.insert_blog(record.clone()).await?;
        Ok(record)
    }

    async fn update_blog(&self, params: UpdateBlogParams) -> Result<BlogRecord, RepoError> {
        let mut data = self.data.write().await;
        if data
            .blogs
            .values()
            .any(|existing| existing.slug == params.slug && existing.id != params.id)
        {
            return Err(RepoError::duplicate("blogs_slug_key"));
        }

        let record = data.blogs.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        record.slug = params.slug;
        record.title = params.title;
        record.body = params.body;
        record.status = params.status;
        record.category_id = params.category_id;
        record.primary_product = params.primary_product;
        record.related_products = params.related_products;
        record.updated_at = OffsetDateTime::now_utc();
        Ok(record.clone())
    }

    async fn delete_blog(&self, id: Uuid) -> Result<BlogRecord, RepoError> {
        self.data
            .write()
            .await
            .blogs
            .remove(&id)
            .ok_or(RepoError::NotFound)
    }
}
