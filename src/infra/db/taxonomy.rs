use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{
        CreateTermParams, RepoError, TaxonomyRepo, TaxonomyWriteRepo, UpdateTermParams,
    },
    domain::entities::TaxonomyRecord,
    domain::types::TaxonomyKind,
};

use super::InMemoryRepositories;

#[async_trait]
impl TaxonomyRepo for InMemoryRepositories {
    async fn list_terms(&self, kind: TaxonomyKind) -> Result<Vec<TaxonomyRecord>, RepoError> {
        let data = self.data.read().await;
        let mut rows: Vec<TaxonomyRecord> = data
            .terms
            .values()
            .filter(|record| record.kind == kind)
            .cloned()
            .collect();
        rows.sort_by(|left, right| left.slug.cmp(&right.slug));
        Ok(rows)
    }

    async fn find_term_by_slug(
        &self,
        kind: TaxonomyKind,
        slug: &str,
    ) -> Result<Option<TaxonomyRecord>, RepoError> {
        let data = self.data.read().await;
        Ok(data
            .terms
            .values()
            .find(|record| record.kind == kind && record.slug == slug)
            .cloned())
    }

    async fn find_term_by_id(
        &self,
        kind: TaxonomyKind,
        id: Uuid,
    ) -> Result<Option<TaxonomyRecord>, RepoError> {
        let data = self.data.read().await;
        Ok(data
            .terms
            .get(&id)
            .filter(|record| record.kind == kind)
            .cloned())
    }
}

#[async_trait]
impl TaxonomyWriteRepo for InMemoryRepositories {
    async fn create_term(&self, params: CreateTermParams) -> Result<TaxonomyRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let record = TaxonomyRecord {
            id: Uuid::new_v4(),
            kind: params.kind,
            slug: params.slug,
            name: params.name,
            parent_id: params.parent_id,
            created_at: now,
            updated_at: now,
        };
        self.insert_term(record.clone()).await?;
        Ok(record)
    }

    async fn update_term(&self, params: UpdateTermParams) -> Result<TaxonomyRecord, RepoError> {
        let mut data = self.data.write().await;
        if data.terms.values().any(|existing| {
            existing.kind == params.kind && existing.slug == params.slug && existing.id != params.id
        }) {
            return Err(RepoError::duplicate("taxonomy_kind_slug_key"));
        }

        let record = data
            .terms
            .get_mut(&params.id)
            .filter(|record| record.kind == params.kind)
            .ok_or(RepoError::NotFound)?;
        record.slug = params.slug;
        record.name = params.name;
        record.parent_id = params.parent_id;
        record.updated_at = OffsetDateTime::now_utc();
        Ok(record.clone())
    }

    async fn delete_term(
        &self,
        kind: TaxonomyKind,
        id: Uuid,
    ) -> Result<TaxonomyRecord, RepoError> {
        let mut data = self.data.write().await;
        if !data.terms.get(&id).is_some_and(|record| record.kind == kind) {
            return Err(RepoError::NotFound);
        }
        data.terms.remove(&id).ok_or(RepoError::NotFound)
    }
}
