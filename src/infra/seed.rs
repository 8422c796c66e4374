//! Loads an initial catalog from a TOML document into the in-memory repositories.
//!
//! Cross references (parent categories, product taxonomy, blog products) are
//! written as slugs and resolved while loading.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::domain::entities::{
    BlogRecord, LocalizedText, ProductRecord, Promotion, TaxonomyRecord, validate_price_cents,
};
use crate::domain::slug::validate_slug;
use crate::domain::types::{PublicationStatus, TaxonomyKind};
use crate::infra::db::InMemoryRepositories;
use crate::infra::error::InfraError;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SeedDocument {
    categories: Vec<SeedTerm>,
    brands: Vec<SeedTerm>,
    products: Vec<SeedProduct>,
    blogs: Vec<SeedBlog>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedTerm {
    slug: String,
    name: LocalizedText,
    parent: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedProduct {
    slug: String,
    name: LocalizedText,
    #[serde(default)]
    description: LocalizedText,
    price_cents: u64,
    currency: String,
    category: Option<String>,
    brand: Option<String>,
    #[serde(default = "published")]
    status: PublicationStatus,
    promotion: Option<Promotion>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedBlog {
    slug: String,
    title: LocalizedText,
    #[serde(default)]
    body: LocalizedText,
    #[serde(default = "published")]
    status: PublicationStatus,
    category: Option<String>,
    primary_product: Option<String>,
    #[serde(default)]
    related_products: Vec<String>,
}

fn published() -> PublicationStatus {
    PublicationStatus::Published
}

/// Number of records loaded per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub categories: usize,
    pub brands: usize,
    pub products: usize,
    pub blogs: usize,
}

pub async fn load_seed_file(
    path: &Path,
    repos: &InMemoryRepositories,
) -> Result<SeedSummary, InfraError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let summary = load_seed_str(&raw, repos)
        .await
        .map_err(|message| InfraError::seed(path, message))?;
    info!(
        path = %path.display(),
        categories = summary.categories,
        brands = summary.brands,
        products = summary.products,
        blogs = summary.blogs,
        "Catalog seeded"
    );
    Ok(summary)
}

/// Parses and loads a seed document; errors are human readable.
pub async fn load_seed_str(
    raw: &str,
    repos: &InMemoryRepositories,
) -> Result<SeedSummary, String> {
    let document: SeedDocument = toml::from_str(raw).map_err(|err| err.to_string())?;
    let now = OffsetDateTime::now_utc();

    let categories = assign_ids(&document.categories, "category")?;
    let brands = assign_ids(&document.brands, "brand")?;

    for (kind, terms, ids) in [
        (TaxonomyKind::Category, &document.categories, &categories),
        (TaxonomyKind::Brand, &document.brands, &brands),
    ] {
        for term in terms {
            let parent_id = match term.parent.as_deref() {
                Some(_) if kind == TaxonomyKind::Brand => {
                    return Err(format!("brand `{}` cannot have a parent", term.slug));
                }
                Some(parent) => Some(resolve(&categories, parent, "category")?),
                None => None,
            };
            repos
                .insert_term(TaxonomyRecord {
                    id: resolve(ids, &term.slug, kind.as_str())?,
                    kind,
                    slug: term.slug.clone(),
                    name: normalized(&term.name, &term.slug)?,
                    parent_id,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .map_err(|err| err.to_string())?;
        }
    }

    let mut products = HashMap::new();
    for product in &document.products {
        check_slug(&product.slug)?;
        validate_price_cents(product.price_cents)
            .map_err(|err| format!("product `{}`: {err}", product.slug))?;
        if let Some(promotion) = &product.promotion {
            promotion
                .validate()
                .map_err(|err| format!("product `{}`: {err}", product.slug))?;
        }
        let record = ProductRecord {
            id: Uuid::new_v4(),
            slug: product.slug.clone(),
            name: normalized(&product.name, &product.slug)?,
            description: normalized(&product.description, &product.slug)?,
            price_cents: product.price_cents,
            currency: product.currency.trim().to_ascii_uppercase(),
            category_id: product
                .category
                .as_deref()
                .map(|slug| resolve(&categories, slug, "category"))
                .transpose()?,
            brand_id: product
                .brand
                .as_deref()
                .map(|slug| resolve(&brands, slug, "brand"))
                .transpose()?,
            status: product.status,
            promotion: product.promotion.clone(),
            created_at: now,
            updated_at: now,
        };
        products.insert(record.slug.clone(), record.id);
        repos
            .insert_product(record)
            .await
            .map_err(|err| err.to_string())?;
    }

    for blog in &document.blogs {
        check_slug(&blog.slug)?;
        let related_products = blog
            .related_products
            .iter()
            .map(|slug| resolve(&products, slug, "product"))
            .collect::<Result<Vec<_>, _>>()?;
        repos
            .insert_blog(BlogRecord {
                id: Uuid::new_v4(),
                slug: blog.slug.clone(),
                title: normalized(&blog.title, &blog.slug)?,
                body: normalized(&blog.body, &blog.slug)?,
                status: blog.status,
                category_id: blog
                    .category
                    .as_deref()
                    .map(|slug| resolve(&categories, slug, "category"))
                    .transpose()?,
                primary_product: blog
                    .primary_product
                    .as_deref()
                    .map(|slug| resolve(&products, slug, "product"))
                    .transpose()?,
                related_products,
                created_at: now,
                updated_at: now,
            })
            .await
            .map_err(|err| err.to_string())?;
    }

    Ok(SeedSummary {
        categories: document.categories.len(),
        brands: document.brands.len(),
        products: document.products.len(),
        blogs: document.blogs.len(),
    })
}

fn assign_ids(terms: &[SeedTerm], kind: &str) -> Result<HashMap<String, Uuid>, String> {
    let mut ids = HashMap::with_capacity(terms.len());
    for term in terms {
        check_slug(&term.slug)?;
        if ids.insert(term.slug.clone(), Uuid::new_v4()).is_some() {
            return Err(format!("duplicate {kind} slug `{}`", term.slug));
        }
    }
    Ok(ids)
}

fn resolve(ids: &HashMap<String, Uuid>, slug: &str, kind: &str) -> Result<Uuid, String> {
    ids.get(slug)
        .copied()
        .ok_or_else(|| format!("unknown {kind} `{slug}`"))
}

fn check_slug(slug: &str) -> Result<(), String> {
    validate_slug(slug)
        .map(|_| ())
        .map_err(|err| format!("slug `{slug}`: {err}"))
}

fn normalized(text: &LocalizedText, owner: &str) -> Result<LocalizedText, String> {
    text.clone()
        .normalized()
        .map_err(|err| format!("`{owner}`: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::{BlogsRepo, ProductsRepo, TaxonomyRepo};

    const SEED: &str = r#"
[[categories]]
slug = "energy"
name = { en = "Energy" }

[[categories]]
slug = "solar"
name = { en = "Solar", de = "Solar" }
parent = "energy"

[[brands]]
slug = "sunco"
name = { en = "SunCo" }

[[products]]
slug = "panel-400w"
name = { en = "Panel 400W", DE = "Modul 400W" }
price_cents = 19999
currency = "usd"
category = "solar"
brand = "sunco"

[[blogs]]
slug = "choosing-panels"
title = { en = "Choosing panels" }
primary_product = "panel-400w"
category = "solar"
"#;

    #[tokio::test]
    async fn seed_resolves_references() {
        let repos = InMemoryRepositories::new();
        let summary = load_seed_str(SEED, &repos).await.expect("seed loads");
        assert_eq!(
            summary,
            SeedSummary {
                categories: 2,
                brands: 1,
                products: 1,
                blogs: 1
            }
        );

        let solar = repos
            .find_term_by_slug(TaxonomyKind::Category, "solar")
            .await
            .expect("query")
            .expect("solar exists");
        let energy = repos
            .find_term_by_slug(TaxonomyKind::Category, "energy")
            .await
            .expect("query")
            .expect("energy exists");
        assert_eq!(solar.parent_id, Some(energy.id));

        let panel = repos
            .find_product_by_slug("panel-400w")
            .await
            .expect("query")
            .expect("panel exists");
        assert_eq!(panel.category_id, Some(solar.id));
        assert_eq!(panel.currency, "USD");

        let blogs = repos
            .list_blogs_referencing_product(panel.id)
            .await
            .expect("query");
        assert_eq!(blogs.len(), 1);
    }

    #[tokio::test]
    async fn unknown_reference_is_reported() {
        let repos = InMemoryRepositories::new();
        let err = load_seed_str(
            r#"
[[products]]
slug = "panel"
name = { en = "Panel" }
price_cents = 1
currency = "USD"
category = "missing"
"#,
            &repos,
        )
        .await
        .expect_err("unknown category");
        assert!(err.contains("unknown category `missing`"));
    }

    #[tokio::test]
    async fn oversized_price_is_rejected() {
        let repos = InMemoryRepositories::new();
        let err = load_seed_str(
            r#"
[[products]]
slug = "yacht"
name = { en = "Yacht" }
price_cents = 1844674407370955161
currency = "USD"
"#,
            &repos,
        )
        .await
        .expect_err("price above cap");
        assert!(err.contains("product `yacht`"));
        assert!(err.contains("price_cents"));
    }
}
