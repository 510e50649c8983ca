//! Process-wide metrics registry.
//!
//! [`Metrics`] is created once at startup and shared as `Arc<Metrics>` with
//! the metrics interceptor, the session assigner, the RPC facade and the
//! storefront handlers. It owns a [`prometheus_client`] [`Registry`]; every
//! family is registered there up front, so `GET /metrics` always lists the
//! full set of families even before the first observation.
//!
//! Metric families (counters gain the `_total` suffix on exposition):
//! - `frontend_http_requests_total`: counter by method, path, status
//! - `frontend_http_request_duration_seconds`: histogram by method, path
//! - `http_server_request_duration_seconds`: histogram by method, route, status_code
//! - `frontend_handler_response_time_seconds`: histogram by handler, method, status
//! - `frontend_grpc_requests_total`: counter by service, method, status
//! - `frontend_grpc_request_duration_seconds`: histogram by service, method
//! - `frontend_cart_operations_total`: counter by operation, status
//! - `frontend_product_views_total`: product pages served
//! - `frontend_currency_conversions_total`: counter by from_currency, to_currency
//! - `frontend_errors_total`: counter by error_type, handler
//! - `frontend_active_sessions_total`: gauge of sessions issued since start
//! - `frontend_recommendations_served_total`: recommended products returned
//!
//! Label values must come from bounded sets (route classification, method
//! allow-list, service and method names, status codes, whitelisted
//! currencies). Raw user input never becomes a label.

use std::time::Duration;

use prometheus_client::{
    encoding::{text::encode, EncodeLabelSet},
    metrics::{counter::Counter, family::Family, gauge::Gauge, histogram::Histogram},
    registry::Registry,
};

/// Default Prometheus client buckets.
const DEFAULT_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Finer low end for user-facing page latencies.
const WEB_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// `success` / `error` label of backend calls and cart writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn of<T, E>(result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(_) => Self::Error,
        }
    }
}

// ---------------------------------------------------------------------------
// Label sets
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct HttpLabels {
    method: String,
    path: String,
    status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct HttpDurationLabels {
    method: String,
    path: String,
}

/// OpenTelemetry-style names for the same observation.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ServerLabels {
    method: String,
    route: String,
    status_code: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct HandlerLabels {
    handler: String,
    method: String,
    status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RpcLabels {
    service: String,
    method: String,
    status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RpcDurationLabels {
    service: String,
    method: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct CartOperationLabels {
    operation: String,
    status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ConversionLabels {
    from_currency: String,
    to_currency: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ErrorLabels {
    error_type: String,
    handler: String,
}

fn default_histogram() -> Histogram {
    Histogram::new(DEFAULT_BUCKETS.iter().copied())
}

fn web_histogram() -> Histogram {
    Histogram::new(WEB_BUCKETS.iter().copied())
}

/// The shared registry. See the module docs for the family list.
#[derive(Debug)]
pub struct Metrics {
    registry: Registry,
    http_requests: Family<HttpLabels, Counter>,
    http_request_duration: Family<HttpDurationLabels, Histogram>,
    http_server_request_duration: Family<ServerLabels, Histogram>,
    handler_response_time: Family<HandlerLabels, Histogram>,
    rpc_requests: Family<RpcLabels, Counter>,
    rpc_request_duration: Family<RpcDurationLabels, Histogram>,
    cart_operations: Family<CartOperationLabels, Counter>,
    product_views: Counter,
    currency_conversions: Family<ConversionLabels, Counter>,
    errors: Family<ErrorLabels, Counter>,
    active_sessions: Gauge,
    recommendations_served: Counter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_requests = Family::<HttpLabels, Counter>::default();
        registry.register(
            "frontend_http_requests",
            "Total number of HTTP requests received",
            http_requests.clone(),
        );

        let http_request_duration =
            Family::<HttpDurationLabels, Histogram>::new_with_constructor(default_histogram);
        registry.register(
            "frontend_http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_request_duration.clone(),
        );

        let http_server_request_duration =
            Family::<ServerLabels, Histogram>::new_with_constructor(web_histogram);
        registry.register(
            "http_server_request_duration_seconds",
            "Duration of HTTP server requests in seconds",
            http_server_request_duration.clone(),
        );

        let handler_response_time =
            Family::<HandlerLabels, Histogram>::new_with_constructor(web_histogram);
        registry.register(
            "frontend_handler_response_time_seconds",
            "Response time for handlers in seconds",
            handler_response_time.clone(),
        );

        let rpc_requests = Family::<RpcLabels, Counter>::default();
        registry.register(
            "frontend_grpc_requests",
            "Total number of RPC requests to backend services",
            rpc_requests.clone(),
        );

        let rpc_request_duration =
            Family::<RpcDurationLabels, Histogram>::new_with_constructor(default_histogram);
        registry.register(
            "frontend_grpc_request_duration_seconds",
            "RPC request duration in seconds",
            rpc_request_duration.clone(),
        );

        let cart_operations = Family::<CartOperationLabels, Counter>::default();
        registry.register(
            "frontend_cart_operations",
            "Total number of cart operations",
            cart_operations.clone(),
        );

        let product_views = Counter::default();
        registry.register(
            "frontend_product_views",
            "Total number of product page views",
            product_views.clone(),
        );

        let currency_conversions = Family::<ConversionLabels, Counter>::default();
        registry.register(
            "frontend_currency_conversions",
            "Total number of currency conversions",
            currency_conversions.clone(),
        );

        let errors = Family::<ErrorLabels, Counter>::default();
        registry.register(
            "frontend_errors",
            "Total number of errors by type",
            errors.clone(),
        );

        let active_sessions = Gauge::default();
        registry.register(
            "frontend_active_sessions_total",
            "Total number of active user sessions",
            active_sessions.clone(),
        );

        let recommendations_served = Counter::default();
        registry.register(
            "frontend_recommendations_served",
            "Total number of product recommendations served",
            recommendations_served.clone(),
        );

        Self {
            registry,
            http_requests,
            http_request_duration,
            http_server_request_duration,
            handler_response_time,
            rpc_requests,
            rpc_request_duration,
            cart_operations,
            product_views,
            currency_conversions,
            errors,
            active_sessions,
            recommendations_served,
        }
    }

    /// Record one finished HTTP request under its normalized path.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let status = status.to_string();
        self.http_requests
            .get_or_create(&HttpLabels {
                method: method.to_owned(),
                path: path.to_owned(),
                status: status.clone(),
            })
            .inc();
        self.http_request_duration
            .get_or_create(&HttpDurationLabels {
                method: method.to_owned(),
                path: path.to_owned(),
            })
            .observe(secs);
        self.http_server_request_duration
            .get_or_create(&ServerLabels {
                method: method.to_owned(),
                route: path.to_owned(),
                status_code: status,
            })
            .observe(secs);
    }

    pub fn record_handler_response_time(
        &self,
        handler: &str,
        method: &str,
        status: u16,
        elapsed: Duration,
    ) {
        self.handler_response_time
            .get_or_create(&HandlerLabels {
                handler: handler.to_owned(),
                method: method.to_owned(),
                status: status.to_string(),
            })
            .observe(elapsed.as_secs_f64());
    }

    /// Record one backend call.
    pub fn record_rpc(&self, service: &str, method: &str, outcome: Outcome, elapsed: Duration) {
        self.rpc_requests
            .get_or_create(&RpcLabels {
                service: service.to_owned(),
                method: method.to_owned(),
                status: outcome.as_str().to_owned(),
            })
            .inc();
        self.rpc_request_duration
            .get_or_create(&RpcDurationLabels {
                service: service.to_owned(),
                method: method.to_owned(),
            })
            .observe(elapsed.as_secs_f64());
    }

    /// `operation` is one of `add` or `empty`.
    pub fn record_cart_operation(&self, operation: &str, outcome: Outcome) {
        self.cart_operations
            .get_or_create(&CartOperationLabels {
                operation: operation.to_owned(),
                status: outcome.as_str().to_owned(),
            })
            .inc();
    }

    pub fn record_product_view(&self) {
        self.product_views.inc();
    }

    /// Callers pass currency codes already reduced to a bounded set.
    pub fn record_currency_conversion(&self, from: &str, to: &str) {
        self.currency_conversions
            .get_or_create(&ConversionLabels {
                from_currency: from.to_owned(),
                to_currency: to.to_owned(),
            })
            .inc();
    }

    pub fn record_error(&self, error_type: &str, handler: &str) {
        self.errors
            .get_or_create(&ErrorLabels {
                error_type: error_type.to_owned(),
                handler: handler.to_owned(),
            })
            .inc();
    }

    pub fn record_new_session(&self) {
        self.active_sessions.inc();
    }

    pub fn record_recommendations_served(&self, n: usize) {
        self.recommendations_served.inc_by(n as u64);
    }

    /// Encode every family in the OpenMetrics text format.
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut out = String::with_capacity(4096);
        encode(&mut out, &self.registry)?;
        Ok(out)
    }
}

#[cfg(test)]
impl Metrics {
    pub fn http_requests(&self, method: &str, path: &str, status: u16) -> u64 {
        self.http_requests
            .get_or_create(&HttpLabels {
                method: method.to_owned(),
                path: path.to_owned(),
                status: status.to_string(),
            })
            .get()
    }

    /// Observation count of one handler histogram series, read back from the
    /// exposition since histograms expose no count accessor.
    pub fn handler_observations(&self, handler: &str, method: &str, status: u16) -> u64 {
        let series = format!(
            "frontend_handler_response_time_seconds_count{{handler=\"{handler}\",method=\"{method}\",status=\"{status}\"}}"
        );
        self.sample(&series).unwrap_or(0)
    }

    pub fn rpc_requests(&self, service: &str, method: &str, outcome: Outcome) -> u64 {
        self.rpc_requests
            .get_or_create(&RpcLabels {
                service: service.to_owned(),
                method: method.to_owned(),
                status: outcome.as_str().to_owned(),
            })
            .get()
    }

    pub fn cart_operations(&self, operation: &str, outcome: Outcome) -> u64 {
        self.cart_operations
            .get_or_create(&CartOperationLabels {
                operation: operation.to_owned(),
                status: outcome.as_str().to_owned(),
            })
            .get()
    }

    pub fn product_views(&self) -> u64 {
        self.product_views.get()
    }

    pub fn currency_conversions(&self, from: &str, to: &str) -> u64 {
        self.currency_conversions
            .get_or_create(&ConversionLabels {
                from_currency: from.to_owned(),
                to_currency: to.to_owned(),
            })
            .get()
    }

    pub fn errors(&self, error_type: &str, handler: &str) -> u64 {
        self.errors
            .get_or_create(&ErrorLabels {
                error_type: error_type.to_owned(),
                handler: handler.to_owned(),
            })
            .get()
    }

    pub fn sessions_started(&self) -> u64 {
        self.active_sessions.get() as u64
    }

    pub fn recommendations_served(&self) -> u64 {
        self.recommendations_served.get()
    }

    /// Integer value of the exposition line starting with `series`.
    pub fn sample(&self, series: &str) -> Option<u64> {
        let text = self.render().ok()?;
        text.lines()
            .find_map(|line| line.strip_prefix(series)?.strip_prefix(' '))
            .and_then(|v| v.trim().parse().ok())
    }
}
