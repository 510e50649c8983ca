//! Instrumented client for the backend services.
//!
//! [`ShopClient`] exposes one method per backend capability. Each method
//! issues exactly one call (no retries), records a
//! `frontend_grpc_requests_total` / `frontend_grpc_request_duration_seconds`
//! observation labelled with service, method and `success`/`error`, and
//! returns the call's own result. Errors are wrapped in [`RpcError`], which
//! names the failing service and method; they are never swallowed.
//!
//! The transport is JSON over HTTP: `POST {addr}/hipstershop.{Service}/{Method}`
//! with the request message as body and the response message as the 2xx body.
//! The underlying [`reqwest::Client`] is built once and shared by all requests.

pub mod error;
pub mod types;

use std::{collections::HashSet, sync::Arc, time::{Duration, Instant}};

use anyhow::Context;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::{Config, ServicesConfig},
    metrics::{Metrics, Outcome},
};

pub use error::{RpcError, Service};
pub use types::{Ad, CartItem, Money, Product};

use types::{
    AdRequest, AdResponse, AddItemRequest, Cart, CurrencyConversionRequest, Empty,
    GetProductRequest, GetQuoteRequest, GetQuoteResponse, GetSupportedCurrenciesResponse,
    ListProductsResponse, ListRecommendationsRequest, ListRecommendationsResponse, UserRequest,
};

/// Hard deadline of the ad call, independent of the caller's.
pub const AD_TIMEOUT: Duration = Duration::from_millis(100);

/// Currencies the storefront offers, whatever else the currency service knows.
pub const WHITELISTED_CURRENCIES: &[&str] = &["USD", "EUR", "CAD", "JPY", "GBP", "TRY"];

/// Currency label for metrics: whitelisted codes as is, anything else `other`.
fn currency_label(code: &str) -> &str {
    if WHITELISTED_CURRENCIES.contains(&code) {
        code
    } else {
        "other"
    }
}

/// Cheap to clone: the HTTP client, addresses and metrics are all shared.
#[derive(Clone)]
pub struct ShopClient {
    http: Client,
    services: Arc<ServicesConfig>,
    avoid_noop_currency_conversion: bool,
    metrics: Arc<Metrics>,
}

impl ShopClient {
    /// Build the shared client from the `[rpc]` and `[services]` config.
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(ms) = config.rpc.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let http = builder.build().context("building reqwest client")?;

        Ok(Self {
            http,
            services: Arc::new(config.services.clone()),
            avoid_noop_currency_conversion: config.rpc.avoid_noop_currency_conversion,
            metrics,
        })
    }

    fn addr(&self, service: Service) -> &str {
        let s = &self.services;
        match service {
            Service::ProductCatalog => &s.product_catalog,
            Service::Currency => &s.currency,
            Service::Cart => &s.cart,
            Service::Recommendation => &s.recommendation,
            Service::Shipping => &s.shipping,
            Service::Ad => &s.ad,
        }
    }

    /// One call: send, check status, decode.
    async fn call<Req, Resp>(
        &self,
        service: Service,
        method: &'static str,
        request: &Req,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!(
            "{}/hipstershop.{}/{method}",
            self.addr(service).trim_end_matches('/'),
            service.name()
        );
        let transport = |error: reqwest::Error| RpcError::Transport { service, method, error };

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let text = response.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(RpcError::Status { service, method, status, body: text });
        }

        serde_json::from_str(&text).map_err(|error| RpcError::Decode { service, method, error })
    }

    /// [`call`](Self::call) plus instrumentation and an optional own deadline.
    async fn invoke<Req, Resp>(
        &self,
        service: Service,
        method: &'static str,
        request: &Req,
        deadline: Option<Duration>,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let started = Instant::now();
        let result = match deadline {
            None => self.call(service, method, request).await,
            Some(limit) => match tokio::time::timeout(limit, self.call(service, method, request)).await {
                Ok(result) => result,
                Err(_) => Err(RpcError::Timeout {
                    service,
                    method,
                    timeout_ms: limit.as_millis() as u64,
                }),
            },
        };
        let elapsed = started.elapsed();

        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(e) => {
                tracing::debug!(
                    service = %e.service(),
                    method = e.method(),
                    optional = e.is_optional(),
                    error = %e,
                    "backend call failed"
                );
                Outcome::Error
            }
        };
        self.metrics
            .record_rpc(service.name(), method, outcome, elapsed);
        result
    }

    /// Supported currencies, restricted to the storefront whitelist.
    pub async fn get_currencies(&self) -> Result<Vec<String>, RpcError> {
        let resp: GetSupportedCurrenciesResponse = self
            .invoke(Service::Currency, "GetSupportedCurrencies", &Empty {}, None)
            .await?;
        let allowed: HashSet<&str> = WHITELISTED_CURRENCIES.iter().copied().collect();
        Ok(resp
            .currency_codes
            .into_iter()
            .filter(|c| allowed.contains(c.as_str()))
            .collect())
    }

    pub async fn get_products(&self) -> Result<Vec<Product>, RpcError> {
        let resp: ListProductsResponse = self
            .invoke(Service::ProductCatalog, "ListProducts", &Empty {}, None)
            .await?;
        Ok(resp.products)
    }

    pub async fn get_product(&self, id: &str) -> Result<Product, RpcError> {
        self.invoke(Service::ProductCatalog, "GetProduct", &GetProductRequest { id }, None)
            .await
    }

    pub async fn get_cart(&self, user_id: &str) -> Result<Vec<CartItem>, RpcError> {
        let cart: Cart = self
            .invoke(Service::Cart, "GetCart", &UserRequest { user_id }, None)
            .await?;
        Ok(cart.items)
    }

    pub async fn empty_cart(&self, user_id: &str) -> Result<(), RpcError> {
        let _: Empty = self
            .invoke(Service::Cart, "EmptyCart", &UserRequest { user_id }, None)
            .await?;
        Ok(())
    }

    pub async fn insert_cart(
        &self,
        user_id: &str,
        product_id: &str,
        quantity: i32,
    ) -> Result<(), RpcError> {
        let request = AddItemRequest {
            user_id,
            item: CartItem {
                product_id: product_id.to_owned(),
                quantity,
            },
        };
        let _: Empty = self
            .invoke(Service::Cart, "AddItem", &request, None)
            .await?;
        Ok(())
    }

    /// Convert `money` into `to_code` through the currency service.
    ///
    /// With `avoid_noop_currency_conversion` enabled, a same-currency request
    /// returns the input unchanged without calling out (and without a metric).
    /// Each successful call counts in `frontend_currency_conversions_total`.
    pub async fn convert_currency(&self, money: &Money, to_code: &str) -> Result<Money, RpcError> {
        if self.avoid_noop_currency_conversion && money.currency_code == to_code {
            return Ok(money.clone());
        }
        let converted = self
            .invoke(
                Service::Currency,
                "Convert",
                &CurrencyConversionRequest { from: money, to_code },
                None,
            )
            .await?;
        self.metrics.record_currency_conversion(
            currency_label(&money.currency_code),
            currency_label(to_code),
        );
        Ok(converted)
    }

    /// Shipping cost of `items` in USD, as quoted by the shipping service.
    ///
    /// A quote without `costUsd` is an error, not free shipping.
    pub async fn get_shipping_quote(&self, items: &[CartItem]) -> Result<Money, RpcError> {
        let resp: GetQuoteResponse = self
            .invoke(
                Service::Shipping,
                "GetQuote",
                &GetQuoteRequest { address: None, items },
                None,
            )
            .await?;
        resp.cost_usd.ok_or(RpcError::MissingField {
            service: Service::Shipping,
            method: "GetQuote",
            field: "costUsd",
        })
    }

    /// Recommended product ids for `user_id`, in the service's order.
    pub async fn list_recommendations(
        &self,
        user_id: &str,
        product_ids: &[String],
    ) -> Result<Vec<String>, RpcError> {
        let resp: ListRecommendationsResponse = self
            .invoke(
                Service::Recommendation,
                "ListRecommendations",
                &ListRecommendationsRequest { user_id, product_ids },
                None,
            )
            .await?;
        Ok(resp.product_ids)
    }

    /// Ads for the given context keys, bounded by [`AD_TIMEOUT`].
    ///
    /// Callers treat any error, timeout included, as "no ad".
    pub async fn get_ads(&self, context_keys: &[String]) -> Result<Vec<Ad>, RpcError> {
        let resp: AdResponse = self
            .invoke(
                Service::Ad,
                "GetAds",
                &AdRequest { context_keys },
                Some(AD_TIMEOUT),
            )
            .await?;
        Ok(resp.ads)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    pub(crate) fn client_for(server: &MockServer) -> ShopClient {
        client_with(server, |_| {})
    }

    pub(crate) fn client_with(server: &MockServer, tweak: impl FnOnce(&mut Config)) -> ShopClient {
        let mut config = Config::default();
        config.services = ServicesConfig::all_at(&server.uri());
        tweak(&mut config);
        ShopClient::new(&config, Arc::new(Metrics::new())).unwrap()
    }

    pub(crate) fn rpc_path(service: Service, rpc: &str) -> String {
        format!("/hipstershop.{}/{rpc}", service.name())
    }

    // -----------------------------------------------------------------------
    // Instrumentation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn success_is_recorded_and_result_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(rpc_path(Service::Cart, "GetCart")))
            .and(body_json(json!({ "userId": "sess-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "userId": "sess-1",
                "items": [{ "productId": "OLJCESPC7Z", "quantity": 2 }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let items = client.get_cart("sess-1").await.unwrap();

        assert_eq!(
            items,
            vec![CartItem { product_id: "OLJCESPC7Z".into(), quantity: 2 }]
        );
        let m = client.metrics();
        assert_eq!(m.rpc_requests("CartService", "GetCart", Outcome::Success), 1);
        assert_eq!(m.rpc_requests("CartService", "GetCart", Outcome::Error), 0);
    }

    #[tokio::test]
    async fn backend_error_is_recorded_propagated_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(rpc_path(Service::ProductCatalog, "GetProduct")))
            .respond_with(ResponseTemplate::new(500).set_body_string("catalog exploded"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.get_product("OLJCESPC7Z").await.unwrap_err();

        assert!(matches!(err, RpcError::Status { .. }), "got {err:?}");
        assert_eq!(err.service(), Service::ProductCatalog);
        assert!(err.to_string().contains("catalog exploded"));
        assert_eq!(
            client
                .metrics()
                .rpc_requests("ProductCatalogService", "GetProduct", Outcome::Error),
            1
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let mut config = Config::default();
        // Port 1 is reserved and never listens, so the connection is refused.
        config.services = ServicesConfig::all_at("http://127.0.0.1:1");
        let client = ShopClient::new(&config, Arc::new(Metrics::new())).unwrap();

        let err = client.get_cart("sess-1").await.unwrap_err();
        assert!(matches!(err, RpcError::Transport { .. }), "got {err:?}");
        assert_eq!(
            client.metrics().rpc_requests("CartService", "GetCart", Outcome::Error),
            1
        );
    }

    #[tokio::test]
    async fn invalid_json_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(rpc_path(Service::Recommendation, "ListRecommendations")))
            .respond_with(ResponseTemplate::new(200).set_body_string("not valid json {{{{"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .list_recommendations("sess-1", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Decode { .. }), "got {err:?}");
        assert!(err.is_optional());
    }

    // -----------------------------------------------------------------------
    // Currency
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn currencies_are_filtered_to_whitelist() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(rpc_path(Service::Currency, "GetSupportedCurrencies")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "currencyCodes": ["EUR", "USD", "BRL", "JPY", "ZAR"]
            })))
            .mount(&server)
            .await;

        let currencies = client_for(&server).get_currencies().await.unwrap();
        assert_eq!(currencies, vec!["EUR", "USD", "JPY"]);
    }

    #[tokio::test]
    async fn same_currency_conversion_calls_out_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(rpc_path(Service::Currency, "Convert")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "currencyCode": "USD", "units": 5, "nanos": 990000000
            })))
            .expect(1)
            .mount(&server)
            .await;

        let usd = Money::new("USD", 5, 990_000_000).unwrap();
        let out = client_for(&server).convert_currency(&usd, "USD").await.unwrap();
        assert_eq!(out, usd);
    }

    #[tokio::test]
    async fn same_currency_conversion_short_circuits_when_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_with(&server, |c| c.rpc.avoid_noop_currency_conversion = true);
        let usd = Money::new("USD", 5, 990_000_000).unwrap();
        assert_eq!(client.convert_currency(&usd, "USD").await.unwrap(), usd);
        assert_eq!(
            client.metrics().rpc_requests("CurrencyService", "Convert", Outcome::Success),
            0
        );
        assert_eq!(client.metrics().currency_conversions("USD", "USD"), 0);
    }

    #[tokio::test]
    async fn conversion_with_out_of_range_nanos_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(rpc_path(Service::Currency, "Convert")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "currencyCode": "EUR", "units": 1, "nanos": -500000000
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let usd = Money::new("USD", 1, 0).unwrap();
        let err = client.convert_currency(&usd, "EUR").await.unwrap_err();

        assert!(matches!(err, RpcError::Decode { .. }), "got {err:?}");
        assert_eq!(client.metrics().currency_conversions("USD", "EUR"), 0);
    }

    #[tokio::test]
    async fn conversions_are_counted_under_bounded_currency_labels() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(rpc_path(Service::Currency, "Convert")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "currencyCode": "EUR", "units": 4, "nanos": 0
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client
            .convert_currency(&Money::new("USD", 5, 0).unwrap(), "EUR")
            .await
            .unwrap();
        client
            .convert_currency(&Money::new("BRL", 5, 0).unwrap(), "EUR")
            .await
            .unwrap();
        client
            .convert_currency(&Money::new("USD", 5, 0).unwrap(), "xx\"injected")
            .await
            .unwrap();

        let m = client.metrics();
        assert_eq!(m.currency_conversions("USD", "EUR"), 1);
        assert_eq!(m.currency_conversions("other", "EUR"), 1);
        assert_eq!(m.currency_conversions("USD", "other"), 1);
        assert!(!m.render().unwrap().contains("BRL"));
    }

    // -----------------------------------------------------------------------
    // Shipping
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn quote_without_cost_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(rpc_path(Service::Shipping, "GetQuote")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.get_shipping_quote(&[]).await.unwrap_err();

        assert!(
            matches!(err, RpcError::MissingField { field: "costUsd", .. }),
            "got {err:?}"
        );
        assert_eq!(err.service(), Service::Shipping);
        // The call itself answered; only its content is unusable.
        assert_eq!(
            client.metrics().rpc_requests("ShippingService", "GetQuote", Outcome::Success),
            1
        );
    }

    // -----------------------------------------------------------------------
    // Ads
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn slow_ad_service_times_out_as_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(rpc_path(Service::Ad, "GetAds")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ads": [] }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let started = Instant::now();
        let err = client.get_ads(&["clothing".into()]).await.unwrap_err();

        assert!(err.is_timeout(), "got {err:?}");
        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(
            client.metrics().rpc_requests("AdService", "GetAds", Outcome::Error),
            1
        );
    }

    #[tokio::test]
    async fn fast_ad_service_returns_ads() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(rpc_path(Service::Ad, "GetAds")))
            .and(body_json(json!({ "contextKeys": ["kitchen"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ads": [{ "redirectUrl": "/product/9SIQT8TOJO", "text": "Bamboo glass jar" }]
            })))
            .mount(&server)
            .await;

        let ads = client_for(&server).get_ads(&["kitchen".into()]).await.unwrap();
        assert_eq!(ads.len(), 1);
        assert_eq!(ads[0].redirect_url, "/product/9SIQT8TOJO");
    }

    // -----------------------------------------------------------------------
    // Cart writes
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn insert_cart_sends_item() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(rpc_path(Service::Cart, "AddItem")))
            .and(body_json(json!({
                "userId": "sess-1",
                "item": { "productId": "66VCHSJNUP", "quantity": 3 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .insert_cart("sess-1", "66VCHSJNUP", 3)
            .await
            .unwrap();
    }
}
