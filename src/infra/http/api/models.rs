//! Request and response shapes owned by the HTTP surface.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::blogs::{BlogFilter, BlogListQuery};
use crate::application::catalog::{ProductFilter, ProductListQuery, ProductSort};
use crate::application::error::AppError;
use crate::application::pagination::PageRequest;
use crate::application::taxonomy::{TermFilter, TermListQuery};
use crate::application::views::format_timestamp;
use crate::domain::types::{Locale, PublicationStatus};

pub fn parse_locale(raw: Option<&str>) -> Result<Locale, AppError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => Ok(Locale::parse(value)?),
        None => Ok(Locale::default()),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LocaleParams {
    pub locale: Option<String>,
}

impl LocaleParams {
    pub fn locale(&self) -> Result<Locale, AppError> {
        parse_locale(self.locale.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductListParams {
    pub locale: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<ProductSort>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub status: Option<PublicationStatus>,
}

impl ProductListParams {
    pub fn into_query(self) -> Result<ProductListQuery, AppError> {
        Ok(ProductListQuery {
            locale: parse_locale(self.locale.as_deref())?,
            page: PageRequest::new(self.page, self.limit),
            sort: self.sort.unwrap_or_default(),
            filter: ProductFilter {
                category: non_blank(self.category),
                brand: non_blank(self.brand),
                search: non_blank(self.search),
                min_price: self.min_price,
                max_price: self.max_price,
                status: self.status,
            },
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BlogListParams {
    pub locale: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub product: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub status: Option<PublicationStatus>,
}

impl BlogListParams {
    pub fn into_query(self) -> Result<BlogListQuery, AppError> {
        Ok(BlogListQuery {
            locale: parse_locale(self.locale.as_deref())?,
            page: PageRequest::new(self.page, self.limit),
            filter: BlogFilter {
                product: non_blank(self.product),
                category: non_blank(self.category),
                search: non_blank(self.search),
                status: self.status,
            },
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TermListParams {
    pub locale: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
}

impl TermListParams {
    pub fn into_query(self) -> Result<TermListQuery, AppError> {
        Ok(TermListQuery {
            locale: parse_locale(self.locale.as_deref())?,
            page: PageRequest::new(self.page, self.limit),
            filter: TermFilter {
                search: non_blank(self.search),
            },
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CartItemRequest {
    pub product_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// Acknowledges an admin write; clients re-read through the public API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationAck {
    pub id: Uuid,
    pub slug: String,
    pub updated_at: String,
}

impl MutationAck {
    pub fn new(id: Uuid, slug: &str, updated_at: time::OffsetDateTime) -> Self {
        Self {
            id,
            slug: slug.to_string(),
            updated_at: format_timestamp(updated_at),
        }
    }
}

/// Blank query values are treated as absent so they never split cache keys.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
