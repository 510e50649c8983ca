//! HTTP surface of the storefront.
//!
//! Handlers are thin: they pull the request context, call the backend facade
//! or the aggregator, and shape a JSON document. Everything cross-cutting
//! (sessions, request ids, logging, metrics) lives in [`crate::middleware`].

pub mod health;
pub mod metrics;
pub mod shop;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::{config::Config, metrics::Metrics, rpc::ShopClient};

/// Process-wide state shared by handlers and interceptors.
pub struct AppState {
    pub config: Arc<Config>,
    pub metrics: Arc<Metrics>,
    pub shop: ShopClient,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> anyhow::Result<Self> {
        let metrics = Arc::new(Metrics::new());
        let shop = ShopClient::new(&config, Arc::clone(&metrics))?;
        Ok(Self { config, metrics, shop })
    }

    #[cfg(test)]
    pub fn for_tests(config: Config) -> Arc<Self> {
        Arc::new(Self::new(Arc::new(config)).expect("test state"))
    }
}

/// Build the storefront router with the full interceptor chain applied.
pub fn router(state: Arc<AppState>) -> Router {
    let app = Router::new()
        .route("/", get(shop::home))
        .route("/product/{id}", get(shop::product))
        .route("/cart", get(shop::view_cart).post(shop::add_to_cart))
        .route("/cart/empty", post(shop::empty_cart))
        .route("/set_currency", post(shop::set_currency))
        .route("/_healthz", get(health::healthz))
        .route("/metrics", get(metrics::metrics))
        .with_state(Arc::clone(&state));

    crate::middleware::compose(app, &state)
}
