//! Composite views built from several backend calls.
//!
//! Both operations are strict: any failing sub-call fails the whole view, and
//! the error says which stage broke. Calls are issued one after another in a
//! fixed order; nothing here runs concurrently.

use crate::rpc::{CartItem, Money, Product, RpcError, ShopClient};

/// At most this many recommended products are returned.
pub const MAX_RECOMMENDATIONS: usize = 4;

/// Failure of one stage of a composite view.
///
/// The message names the stage only; the failed call is the error's source.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("failed to get shipping quote")]
    ShippingQuote(#[source] RpcError),

    #[error("failed to convert currency for shipping cost")]
    CurrencyConversion(#[source] RpcError),

    #[error("failed to list recommendations")]
    RecommendationList(#[source] RpcError),

    #[error("failed to get recommended product info (#{product_id})")]
    RecommendedProduct {
        product_id: String,
        #[source]
        source: RpcError,
    },
}

impl AggregateError {
    pub fn rpc(&self) -> &RpcError {
        match self {
            Self::ShippingQuote(e)
            | Self::CurrencyConversion(e)
            | Self::RecommendationList(e)
            | Self::RecommendedProduct { source: e, .. } => e,
        }
    }

    /// True when the view is optional enrichment (recommendations).
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::RecommendationList(_) | Self::RecommendedProduct { .. })
    }
}

/// Shipping cost of `items` expressed in `currency`.
///
/// Quotes first, then converts the quote; the result is exactly what the
/// currency service returned.
pub async fn localized_shipping_cost(
    shop: &ShopClient,
    items: &[CartItem],
    currency: &str,
) -> Result<Money, AggregateError> {
    let quote = shop
        .get_shipping_quote(items)
        .await
        .map_err(AggregateError::ShippingQuote)?;
    shop.convert_currency(&quote, currency)
        .await
        .map_err(AggregateError::CurrencyConversion)
}

/// Up to [`MAX_RECOMMENDATIONS`] recommended products for `user_id`.
///
/// Every candidate id is looked up, in order, before truncating. One failed
/// lookup voids the whole result.
pub async fn recommendations(
    shop: &ShopClient,
    user_id: &str,
    product_ids: &[String],
) -> Result<Vec<Product>, AggregateError> {
    let candidates = shop
        .list_recommendations(user_id, product_ids)
        .await
        .map_err(AggregateError::RecommendationList)?;

    let mut products = Vec::with_capacity(candidates.len());
    for id in candidates {
        let product = shop
            .get_product(&id)
            .await
            .map_err(|source| AggregateError::RecommendedProduct {
                product_id: id.clone(),
                source,
            })?;
        products.push(product);
    }

    products.truncate(MAX_RECOMMENDATIONS);
    shop.metrics().record_recommendations_served(products.len());
    Ok(products)
}
