//! Catalog entities held by the origin repositories.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{
    error::DomainError,
    types::{DEFAULT_LOCALE, Locale, PublicationStatus, TaxonomyKind},
};

/// Upper bound for the quantity of one cart line.
pub const MAX_CART_ITEM_QUANTITY: u32 = 99;

/// Upper bound for a list price, one billion in major units.
pub const MAX_PRICE_CENTS: u64 = 100_000_000_000;

pub fn validate_price_cents(price_cents: u64) -> Result<(), DomainError> {
    if price_cents > MAX_PRICE_CENTS {
        return Err(DomainError::validation(format!(
            "price_cents must not exceed {MAX_PRICE_CENTS}"
        )));
    }
    Ok(())
}

/// Text keyed by locale tag, ordered so serialized output is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedText(BTreeMap<String, String>);

impl LocalizedText {
    /// Text in the default locale.
    pub fn new(text: impl Into<String>) -> Self {
        Self(BTreeMap::from([(DEFAULT_LOCALE.to_string(), text.into())]))
    }

    pub fn with(mut self, locale: &Locale, text: impl Into<String>) -> Self {
        self.0.insert(locale.as_str().to_string(), text.into());
        self
    }

    /// Best match for `locale`: exact tag, then its language, then the
    /// default locale, then any translation.
    pub fn resolve(&self, locale: &Locale) -> &str {
        self.0
            .get(locale.as_str())
            .or_else(|| self.0.get(locale.language()))
            .or_else(|| self.0.get(DEFAULT_LOCALE))
            .or_else(|| self.0.values().next())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn is_blank(&self) -> bool {
        self.0.values().all(|text| text.trim().is_empty())
    }

    /// Re-keys every entry by its normalized locale.
    pub fn normalized(self) -> Result<Self, DomainError> {
        self.0
            .into_iter()
            .map(|(locale, text)| Ok((Locale::parse(&locale)?.as_str().to_string(), text)))
            .collect::<Result<BTreeMap<_, _>, DomainError>>()
            .map(Self)
    }

    pub fn contains(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.0
            .values()
            .any(|text| text.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub label: String,
    pub percent_off: u8,
}

impl Promotion {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.label.trim().is_empty() {
            return Err(DomainError::validation("promotion label must not be empty"));
        }
        if !(1..=100).contains(&self.percent_off) {
            return Err(DomainError::validation(
                "promotion percent_off must be between 1 and 100",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub id: Uuid,
    pub slug: String,
    pub name: LocalizedText,
    pub description: LocalizedText,
    pub price_cents: u64,
    pub currency: String,
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub status: PublicationStatus,
    pub promotion: Option<Promotion>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ProductRecord {
    /// Price after the active promotion, rounded down to the cent.
    pub fn effective_price_cents(&self) -> u64 {
        match &self.promotion {
            Some(promotion) => {
                let kept = u128::from(100 - promotion.percent_off.min(100));
                // Never exceeds the list price, so the narrowing cannot fail.
                u64::try_from(u128::from(self.price_cents) * kept / 100)
                    .unwrap_or(self.price_cents)
            }
            None => self.price_cents,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlogRecord {
    pub id: Uuid,
    pub slug: String,
    pub title: LocalizedText,
    pub body: LocalizedText,
    pub status: PublicationStatus,
    pub category_id: Option<Uuid>,
    pub primary_product: Option<Uuid>,
    pub related_products: Vec<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl BlogRecord {
    /// Primary product first, then related products, without duplicates.
    pub fn referenced_products(&self) -> Vec<Uuid> {
        let mut ids = Vec::with_capacity(self.related_products.len() + 1);
        for id in self
            .primary_product
            .iter()
            .chain(self.related_products.iter())
        {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }

    pub fn references_product(&self, product_id: Uuid) -> bool {
        self.primary_product == Some(product_id) || self.related_products.contains(&product_id)
    }
}

/// A category or brand.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxonomyRecord {
    pub id: Uuid,
    pub kind: TaxonomyKind,
    pub slug: String,
    pub name: LocalizedText,
    /// Categories only.
    pub parent_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CartRecord {
    pub session_id: String,
    pub items: Vec<CartItem>,
    pub updated_at: OffsetDateTime,
}

impl CartRecord {
    pub fn empty(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            items: Vec::new(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    /// Adds `quantity` to the line for `product_id`, creating it if needed.
    pub fn add_item(&mut self, product_id: Uuid, quantity: u32) -> Result<(), DomainError> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }

        let current = self
            .items
            .iter()
            .find(|item| item.product_id == product_id)
            .map(|item| item.quantity)
            .unwrap_or(0);
        let total = current.saturating_add(quantity);
        if total > MAX_CART_ITEM_QUANTITY {
            return Err(DomainError::validation(format!(
                "quantity per item must not exceed {MAX_CART_ITEM_QUANTITY}"
            )));
        }

        match self
            .items
            .iter_mut()
            .find(|item| item.product_id == product_id)
        {
            Some(item) => item.quantity = total,
            None => self.items.push(CartItem {
                product_id,
                quantity,
            }),
        }
        self.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    /// Returns whether a line was removed.
    pub fn remove_item(&mut self, product_id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.product_id != product_id);
        let removed = self.items.len() != before;
        if removed {
            self.updated_at = OffsetDateTime::now_utc();
        }
        removed
    }
}
