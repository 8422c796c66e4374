//! Response shapes produced by the catalog services.
//!
//! These are the values the read-through cache stores, so they must
//! serialize deterministically: no hash maps, localized text already
//! resolved, timestamps pre-formatted.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::application::pagination::{Page, PaginationMeta};
use crate::cache::Cacheable;
use crate::domain::entities::{BlogRecord, ProductRecord, Promotion, TaxonomyRecord};
use crate::domain::types::{Locale, PublicationStatus};

/// Paginated success envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListEnvelope<T> {
    pub success: bool,
    pub items: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> ListEnvelope<T> {
    pub fn from_page(page: Page<T>) -> Self {
        Self {
            success: true,
            pagination: PaginationMeta::new(page.request, page.total),
            items: page.items,
        }
    }
}

impl<T> Cacheable for ListEnvelope<T> {
    fn is_cacheable(&self) -> bool {
        self.success
    }
}

/// Single-resource success envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEnvelope<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ItemEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T> Cacheable for ItemEnvelope<T> {
    fn is_cacheable(&self) -> bool {
        self.success
    }
}

pub fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub price_cents: u64,
    pub effective_price_cents: u64,
    pub currency: String,
    pub promotion: Option<Promotion>,
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub status: PublicationStatus,
    pub updated_at: String,
}

impl ProductSummary {
    pub fn from_record(record: &ProductRecord, locale: &Locale) -> Self {
        Self {
            id: record.id,
            slug: record.slug.clone(),
            name: record.name.resolve(locale).to_string(),
            price_cents: record.price_cents,
            effective_price_cents: record.effective_price_cents(),
            currency: record.currency.clone(),
            promotion: record.promotion.clone(),
            category_id: record.category_id,
            brand_id: record.brand_id,
            status: record.status,
            updated_at: format_timestamp(record.updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub summary: ProductSummary,
    pub description: String,
    pub related_blogs: Vec<BlogSnippet>,
}

/// Compact product reference embedded in blogs and carts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnippet {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub effective_price_cents: u64,
    pub currency: String,
}

impl ProductSnippet {
    pub fn from_record(record: &ProductRecord, locale: &Locale) -> Self {
        Self {
            id: record.id,
            slug: record.slug.clone(),
            name: record.name.resolve(locale).to_string(),
            effective_price_cents: record.effective_price_cents(),
            currency: record.currency.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogSnippet {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
}

impl BlogSnippet {
    pub fn from_record(record: &BlogRecord, locale: &Locale) -> Self {
        Self {
            id: record.id,
            slug: record.slug.clone(),
            title: record.title.resolve(locale).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogSummary {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub status: PublicationStatus,
    pub category_id: Option<Uuid>,
    pub primary_product: Option<ProductSnippet>,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogDetail {
    #[serde(flatten)]
    pub summary: BlogSummary,
    pub body: String,
    pub products: Vec<ProductSnippet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermView {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub parent_id: Option<Uuid>,
}

impl TermView {
    pub fn from_record(record: &TaxonomyRecord, locale: &Locale) -> Self {
        Self {
            id: record.id,
            slug: record.slug.clone(),
            name: record.name.resolve(locale).to_string(),
            parent_id: record.parent_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub children: Vec<CategoryNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product: ProductSnippet,
    pub quantity: u32,
    pub line_total_cents: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartView {
    pub session_id: String,
    pub items: Vec<CartLine>,
    pub item_count: u32,
    pub total_cents: u64,
    pub updated_at: Option<String>,
}
