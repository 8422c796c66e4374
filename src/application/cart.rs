//! Session carts. Cart views are cached per session and purged on every change.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::repos::{CartRepo, ProductsRepo, RepoError, with_timeout};
use crate::application::views::{
    CartLine, CartView, ItemEnvelope, ProductSnippet, format_timestamp,
};
use crate::cache::{
    CacheScope, CacheState, DetailIdent, EntityKind, Lookup, Mutation, MutationKind, Namespace,
};
use crate::domain::entities::{CartRecord, ProductRecord};
use crate::domain::types::Locale;

const MIN_SESSION_ID_LEN: usize = 8;
const MAX_SESSION_ID_LEN: usize = 128;

/// Checks the shape of a client supplied session id.
pub fn validate_session_id(raw: &str) -> Result<&str, AppError> {
    let session = raw.trim();
    if !(MIN_SESSION_ID_LEN..=MAX_SESSION_ID_LEN).contains(&session.len())
        || !session
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(AppError::validation(format!(
            "session id must be {MIN_SESSION_ID_LEN}-{MAX_SESSION_ID_LEN} characters of [A-Za-z0-9_-]"
        )));
    }
    Ok(session)
}

/// Line total at the effective price, saturating instead of wrapping.
fn line_total_cents(product: &ProductRecord, quantity: u32) -> u64 {
    product
        .effective_price_cents()
        .saturating_mul(u64::from(quantity))
}

pub struct CartService {
    carts: Arc<dyn CartRepo>,
    products: Arc<dyn ProductsRepo>,
    cache: CacheState,
    origin_timeout: Duration,
}

impl CartService {
    pub fn new(
        carts: Arc<dyn CartRepo>,
        products: Arc<dyn ProductsRepo>,
        cache: CacheState,
        origin_timeout: Duration,
    ) -> Self {
        Self {
            carts,
            products,
            cache,
            origin_timeout,
        }
    }

    #[instrument(skip_all)]
    pub async fn get_cart(
        &self,
        session_id: &str,
        locale: &Locale,
    ) -> Result<Lookup<ItemEnvelope<CartView>>, AppError> {
        let session = validate_session_id(session_id)?;
        let key = self.cache.keys.detail(
            CacheScope::Public,
            Namespace::Cart,
            DetailIdent::Id(session.to_string()),
            Some(locale.as_str()),
        );
        self.cache
            .read_through
            .fetch(Some(&key), || async {
                let cart = self
                    .origin(self.carts.load_cart(session))
                    .await?
                    .unwrap_or_else(|| CartRecord::empty(session));
                Ok::<_, AppError>(ItemEnvelope::new(self.render(&cart, locale).await?))
            })
            .await
    }

    #[instrument(skip(self, session_id))]
    pub async fn add_item(
        &self,
        session_id: &str,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<CartRecord, AppError> {
        let session = validate_session_id(session_id)?;
        let product = self
            .origin(self.products.find_product_by_id(product_id))
            .await?
            .filter(|product| product.status.is_public())
            .ok_or_else(|| AppError::validation(format!("unknown product `{product_id}`")))?;

        let mut cart = self
            .origin(self.carts.load_cart(session))
            .await?
            .unwrap_or_else(|| CartRecord::empty(session));
        cart.add_item(product.id, quantity)?;
        self.origin(self.carts.save_cart(cart.clone())).await?;

        info!(product_id = %product.id, quantity, "Cart item added");
        self.invalidate(session).await;
        Ok(cart)
    }

    #[instrument(skip(self, session_id))]
    pub async fn remove_item(
        &self,
        session_id: &str,
        product_id: Uuid,
    ) -> Result<CartRecord, AppError> {
        let session = validate_session_id(session_id)?;
        let mut cart = self
            .origin(self.carts.load_cart(session))
            .await?
            .ok_or(AppError::NotFound)?;
        if !cart.remove_item(product_id) {
            return Err(AppError::NotFound);
        }
        self.origin(self.carts.save_cart(cart.clone())).await?;

        info!(product_id = %product_id, "Cart item removed");
        self.invalidate(session).await;
        Ok(cart)
    }

    async fn invalidate(&self, session: &str) {
        self.cache
            .invalidator
            .invalidate(&Mutation::new(
                EntityKind::Cart,
                MutationKind::Updated,
                session,
            ))
            .await;
    }

    /// Prices lines at current product prices; lines for withdrawn products are dropped.
    async fn render(&self, cart: &CartRecord, locale: &Locale) -> Result<CartView, AppError> {
        let ids: Vec<Uuid> = cart.items.iter().map(|item| item.product_id).collect();
        let products: HashMap<_, _> = if ids.is_empty() {
            HashMap::new()
        } else {
            self.origin(self.products.find_products_by_ids(&ids))
                .await?
                .into_iter()
                .filter(|product| product.status.is_public())
                .map(|product| (product.id, product))
                .collect()
        };

        let items: Vec<CartLine> = cart
            .items
            .iter()
            .filter_map(|item| {
                let product = products.get(&item.product_id)?;
                Some(CartLine {
                    product: ProductSnippet::from_record(product, locale),
                    quantity: item.quantity,
                    line_total_cents: line_total_cents(product, item.quantity),
                })
            })
            .collect();

        Ok(CartView {
            session_id: cart.session_id.clone(),
            item_count: items.iter().map(|line| line.quantity).sum(),
            total_cents: items
                .iter()
                .fold(0u64, |total, line| total.saturating_add(line.line_total_cents)),
            updated_at: (!cart.items.is_empty()).then(|| format_timestamp(cart.updated_at)),
            items,
        })
    }

    async fn origin<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, RepoError>>,
    ) -> Result<T, RepoError> {
        with_timeout(self.origin_timeout, fut).await
    }
}
