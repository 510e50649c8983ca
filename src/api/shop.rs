//! Storefront handlers.
//!
//! Each handler answers with a JSON view model of the page the shop would
//! render. Required backend calls fail the request with `500`; ads and
//! recommendations are best effort and come back as `null` when their
//! services misbehave.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect},
    Form, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    aggregate,
    api::AppState,
    context::RequestContext,
    error::AppError,
    metrics::Outcome,
    middleware::session::read_cookie,
    rpc::{Ad, CartItem, Money, Product, ShopClient, WHITELISTED_CURRENCIES},
};

/// Cookie carrying the display currency chosen by the user.
pub const CURRENCY_COOKIE: &str = "shop_currency";

pub const DEFAULT_CURRENCY: &str = "USD";

const MAX_QUANTITY: u32 = 10;

/// Display currency of this request. Unreadable cookies fall back to USD.
fn user_currency(headers: &HeaderMap) -> String {
    match read_cookie(headers, CURRENCY_COOKIE) {
        Ok(Some(code)) if !code.is_empty() => code.to_owned(),
        _ => DEFAULT_CURRENCY.to_owned(),
    }
}

fn cart_size(items: &[CartItem]) -> i64 {
    items.iter().map(|i| i64::from(i.quantity)).sum()
}

/// Price of `product` in `currency`. A product without a price is an error.
async fn localized_price(
    shop: &ShopClient,
    product: &Product,
    currency: &str,
) -> anyhow::Result<Money> {
    let usd = product
        .price_usd
        .as_ref()
        .ok_or_else(|| anyhow!("product #{} has no price", product.id))?;
    Ok(shop.convert_currency(usd, currency).await?)
}

fn price_view(price: &Money) -> Value {
    json!({ "amount": price, "display": price.to_string() })
}

/// One ad for the page, if the ad service answers in time.
async fn choose_ad(shop: &ShopClient, context_keys: &[String]) -> Option<Ad> {
    match shop.get_ads(context_keys).await {
        Ok(ads) => ads.into_iter().next(),
        Err(e) => {
            tracing::warn!(error = %e, timed_out = e.is_timeout(), "failed to retrieve ads");
            None
        }
    }
}

async fn optional_recommendations(
    shop: &ShopClient,
    user_id: &str,
    product_ids: &[String],
) -> Option<Vec<Product>> {
    match aggregate::recommendations(shop, user_id, product_ids).await {
        Ok(products) => Some(products),
        Err(e) => {
            tracing::warn!(
                error = %e,
                cause = %e.rpc(),
                service = %e.rpc().service(),
                optional = e.is_optional(),
                "failed to get product recommendations"
            );
            None
        }
    }
}

/// `GET /`: catalog in the user's currency.
pub async fn home(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let shop = &state.shop;
    let currency = user_currency(&headers);

    let currencies = shop
        .get_currencies()
        .await
        .context("could not retrieve currencies")?;
    let products = shop
        .get_products()
        .await
        .context("could not retrieve products")?;
    let cart = shop
        .get_cart(ctx.session_id.as_str())
        .await
        .context("could not retrieve cart")?;

    let mut items = Vec::with_capacity(products.len());
    for product in products {
        let price = localized_price(shop, &product, &currency)
            .await
            .with_context(|| format!("failed to do currency conversion for product {}", product.id))?;
        items.push(json!({ "product": product, "price": price_view(&price) }));
    }

    let ad = choose_ad(shop, &[]).await;

    Ok(Json(json!({
        "session_id": ctx.session_id.as_str(),
        "request_id": ctx.request_id.0,
        "user_currency": currency,
        "currencies": currencies,
        "products": items,
        "cart_size": cart_size(&cart),
        "ad": ad,
    })))
}

/// `GET /product/{id}`
pub async fn product(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let shop = &state.shop;
    let currency = user_currency(&headers);
    tracing::debug!(parent: &ctx.span, product = %id, currency = %currency, "serving product page");

    let product = shop
        .get_product(&id)
        .await
        .context("could not retrieve product")?;
    let currencies = shop
        .get_currencies()
        .await
        .context("could not retrieve currencies")?;
    let cart = shop
        .get_cart(ctx.session_id.as_str())
        .await
        .context("could not retrieve cart")?;
    let price = localized_price(shop, &product, &currency)
        .await
        .context("failed to convert currency")?;

    let recommendations =
        optional_recommendations(shop, ctx.session_id.as_str(), std::slice::from_ref(&id)).await;
    let ad = choose_ad(shop, &product.categories).await;
    state.metrics.record_product_view();

    Ok(Json(json!({
        "session_id": ctx.session_id.as_str(),
        "request_id": ctx.request_id.0,
        "user_currency": currency,
        "currencies": currencies,
        "product": product,
        "price": price_view(&price),
        "recommendations": recommendations,
        "cart_size": cart_size(&cart),
        "ad": ad,
    })))
}

/// `GET /cart`: line items, shipping and the grand total in the user's currency.
pub async fn view_cart(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let shop = &state.shop;
    let currency = user_currency(&headers);
    let session = ctx.session_id.as_str();

    let currencies = shop
        .get_currencies()
        .await
        .context("could not retrieve currencies")?;
    let items = shop.get_cart(session).await.context("could not retrieve cart")?;

    let product_ids: Vec<String> = items.iter().map(|i| i.product_id.clone()).collect();
    let recommendations = optional_recommendations(shop, session, &product_ids).await;

    let shipping = aggregate::localized_shipping_cost(shop, &items, &currency).await?;

    let mut total = Money::zero(currency.as_str());
    let mut lines = Vec::with_capacity(items.len());
    for item in &items {
        let product = shop
            .get_product(&item.product_id)
            .await
            .with_context(|| format!("could not retrieve product #{}", item.product_id))?;
        let price = localized_price(shop, &product, &currency)
            .await
            .with_context(|| format!("could not convert currency for product #{}", item.product_id))?;
        let quantity = u32::try_from(item.quantity)
            .map_err(|_| anyhow!("cart holds negative quantity for product #{}", item.product_id))?;
        let line_total = price.multiply(quantity)?;
        total = total.sum(&line_total)?;
        lines.push(json!({
            "product": product,
            "quantity": item.quantity,
            "price": price_view(&line_total),
        }));
    }
    total = total.sum(&shipping)?;

    Ok(Json(json!({
        "session_id": session,
        "request_id": ctx.request_id.0,
        "user_currency": currency,
        "currencies": currencies,
        "items": lines,
        "cart_size": cart_size(&items),
        "shipping_cost": price_view(&shipping),
        "total_cost": price_view(&total),
        "recommendations": recommendations,
    })))
}

#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    product_id: String,
    quantity: u32,
}

/// `POST /cart`
///
/// Rejected quantities and failed backend calls both count as a failed
/// `add` cart operation.
pub async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Form(form): Form<AddToCartForm>,
) -> Result<Redirect, AppError> {
    let result = add_item(&state.shop, &ctx, &form).await;
    state
        .metrics
        .record_cart_operation("add", Outcome::of(&result));
    result?;
    Ok(Redirect::to("/cart"))
}

async fn add_item(shop: &ShopClient, ctx: &RequestContext, form: &AddToCartForm) -> Result<(), AppError> {
    if !(1..=MAX_QUANTITY).contains(&form.quantity) {
        return Err(AppError::bad_request(format!(
            "invalid quantity {}: must be between 1 and {MAX_QUANTITY}",
            form.quantity
        )));
    }
    tracing::debug!(
        parent: &ctx.span,
        product = %form.product_id,
        quantity = form.quantity,
        "adding to cart"
    );

    let product = shop
        .get_product(&form.product_id)
        .await
        .context("could not retrieve product")?;
    // Bounded by MAX_QUANTITY above.
    let quantity = form.quantity as i32;
    shop.insert_cart(ctx.session_id.as_str(), &product.id, quantity)
        .await
        .context("failed to add to cart")?;
    Ok(())
}

/// `POST /cart/empty`
pub async fn empty_cart(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Redirect, AppError> {
    tracing::debug!(parent: &ctx.span, "emptying cart");
    let result = state.shop.empty_cart(ctx.session_id.as_str()).await;
    state
        .metrics
        .record_cart_operation("empty", Outcome::of(&result));
    result.context("failed to empty cart")?;
    Ok(Redirect::to("/"))
}

#[derive(Debug, Deserialize)]
pub struct SetCurrencyForm {
    currency_code: String,
}

/// `POST /set_currency`: remember the display currency, then go back.
pub async fn set_currency(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<SetCurrencyForm>,
) -> Result<impl IntoResponse, AppError> {
    if !WHITELISTED_CURRENCIES.contains(&form.currency_code.as_str()) {
        return Err(AppError::bad_request(format!(
            "unsupported currency {:?}",
            form.currency_code
        )));
    }

    let cookie = format!(
        "{CURRENCY_COOKIE}={}; Path=/; Max-Age={}",
        form.currency_code, state.config.session.max_age_secs
    );
    let back = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("/");

    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(back)))
}
