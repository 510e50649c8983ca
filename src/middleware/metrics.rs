//! HTTP metrics interceptor.
//!
//! Outermost layer of the chain: it sees every request, including those the
//! session interceptor rejects. The route is classified from the path as it
//! arrived, before any handler runs, and all three observations are recorded
//! once the wrapped service has produced its response. Responses carrying an
//! [`ErrorType`] are also counted in `frontend_errors_total` under the
//! route's handler name.

use std::{sync::Arc, time::Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{api::AppState, error::ErrorType, middleware::route};

pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let route = route::classify(req.uri().path());
    let method = route::method_label(req.method());

    let response = next.run(req).await;

    let elapsed = started.elapsed();
    let status = response.status().as_u16();
    let metrics = &state.metrics;
    metrics.record_http_request(method, route.path, status, elapsed);
    metrics.record_handler_response_time(route.handler, method, status, elapsed);
    if let Some(error_type) = response.extensions().get::<ErrorType>() {
        metrics.record_error(error_type.as_str(), route.handler);
    }

    response
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode, Uri},
        middleware,
        response::Redirect,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{config::Config, error::AppError};

    fn app(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/", get(|| async { "home" }))
            .route("/cart", get(|| async { "cart" }))
            .route("/product/{id}", get(|| async { "product" }))
            .route("/broken", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
            .route("/moved", get(|| async { Redirect::to("/cart") }))
            .route(
                "/cart/checkout",
                get(|| async { AppError::bad_request("empty cart") }),
            )
            .layer(middleware::from_fn_with_state(state, metrics_middleware))
    }

    async fn hit(app: Router, method: &str, uri: &str) -> StatusCode {
        app.oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
    }

    #[tokio::test]
    async fn records_counter_and_both_histograms() {
        let state = AppState::for_tests(Config::default());
        let status = hit(app(Arc::clone(&state)), "GET", "/product/OLJCESPC7Z").await;
        assert_eq!(status, StatusCode::OK);

        let m = &state.metrics;
        assert_eq!(m.http_requests("GET", "/product/{id}", 200), 1);
        assert_eq!(m.handler_observations("product", "GET", 200), 1);
        assert_eq!(
            m.sample("frontend_http_request_duration_seconds_count{method=\"GET\",path=\"/product/{id}\"}"),
            Some(1)
        );
    }

    #[tokio::test]
    async fn records_the_final_status_code() {
        let state = AppState::for_tests(Config::default());
        hit(app(Arc::clone(&state)), "GET", "/broken").await;
        assert_eq!(state.metrics.http_requests("GET", "/{unmatched}", 503), 1);
        assert_eq!(state.metrics.handler_observations("unknown", "GET", 503), 1);
    }

    #[tokio::test]
    async fn redirects_are_attributed_to_the_original_path() {
        let state = AppState::for_tests(Config::default());
        let status = hit(app(Arc::clone(&state)), "GET", "/moved").await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(state.metrics.http_requests("GET", "/cart", 303), 0);
        assert_eq!(state.metrics.http_requests("GET", "/{unmatched}", 303), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_each_count_once() {
        let state = AppState::for_tests(Config::default());
        let app = app(Arc::clone(&state));

        let tasks: Vec<_> = (0..100)
            .map(|_| {
                let app = app.clone();
                tokio::spawn(async move { hit(app, "GET", "/cart").await })
            })
            .collect();
        for t in tasks {
            assert_eq!(t.await.unwrap(), StatusCode::OK);
        }

        assert_eq!(state.metrics.http_requests("GET", "/cart", 200), 100);
        assert_eq!(state.metrics.handler_observations("cart", "GET", 200), 100);
    }

    #[tokio::test]
    async fn extension_methods_are_counted_as_other() {
        let state = AppState::for_tests(Config::default());
        for raw in ["RANDOM0X", "RANDOM1X", "RANDOM2X"] {
            let req = Request::builder()
                .method(Method::from_bytes(raw.as_bytes()).unwrap())
                .uri("/cart")
                .body(Body::empty())
                .unwrap();
            app(Arc::clone(&state)).oneshot(req).await.unwrap();
        }

        assert_eq!(state.metrics.http_requests("OTHER", "/cart", 405), 3);
        assert_eq!(state.metrics.handler_observations("cart", "OTHER", 405), 3);
        let text = state.metrics.render().unwrap();
        assert!(!text.contains("RANDOM"), "{text}");
    }

    #[tokio::test]
    async fn error_responses_are_counted_by_type_and_handler() {
        let state = AppState::for_tests(Config::default());
        let status = hit(app(Arc::clone(&state)), "GET", "/cart/checkout").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        hit(app(Arc::clone(&state)), "GET", "/broken").await;

        assert_eq!(state.metrics.errors("validation_error", "checkout"), 1);
        // A bare status code is not an error the handler reported.
        assert_eq!(state.metrics.errors("internal_error", "unknown"), 0);
    }

    #[test]
    fn classification_ignores_query_string() {
        let uri: Uri = "/product/66VCHSJNUP?currency=EUR".parse().unwrap();
        assert_eq!(route::classify(uri.path()).handler, "product");
    }
}
