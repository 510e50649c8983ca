//! Route classification for metric labels.
//!
//! Maps a raw request path to a `(normalized path, handler name)` pair drawn
//! from a fixed set, so label cardinality stays bounded no matter what paths
//! clients send. Product ids, file names and unknown paths never leak into a
//! label. Methods get the same treatment through [`method_label`].

use axum::http::Method;

/// Normalized path and handler name of a classified request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub path: &'static str,
    pub handler: &'static str,
}

impl Route {
    const fn new(path: &'static str, handler: &'static str) -> Self {
        Self { path, handler }
    }
}

/// Exact paths served by the frontend.
const EXACT: &[(&str, &str)] = &[
    ("/", "home"),
    ("/cart", "cart"),
    ("/cart/empty", "cart"),
    ("/cart/checkout", "checkout"),
    ("/set_currency", "set-currency"),
    ("/logout", "logout"),
    ("/_healthz", "health"),
    ("/metrics", "metrics"),
];

/// Top-level segments whose name may become a handler label for paths not
/// listed in [`EXACT`].
const KNOWN_SEGMENTS: &[(&str, &str)] = &[
    ("cart", "/cart/{action}"),
    ("logout", "/logout"),
    ("metrics", "/metrics"),
    ("assistant", "/assistant"),
    ("bot", "/bot"),
    ("robots.txt", "/robots.txt"),
];

/// Classify `path` (without query string).
pub fn classify(path: &str) -> Route {
    if path.starts_with("/product/") {
        return Route::new("/product/{id}", "product");
    }
    if path.starts_with("/product-meta/") {
        return Route::new("/product-meta/{ids}", "product-meta");
    }
    if path.starts_with("/static/") {
        return Route::new("/static/{file}", "static");
    }
    if let Some(&(p, h)) = EXACT.iter().find(|(p, _)| *p == path) {
        return Route::new(p, h);
    }

    let first = path.trim_matches('/').split('/').next().unwrap_or("");
    match KNOWN_SEGMENTS.iter().find(|(seg, _)| *seg == first) {
        Some(&(seg, normalized)) => Route::new(normalized, seg),
        None => Route::new("/{unmatched}", "unknown"),
    }
}

/// Metric label of a request method. Extension methods collapse to `OTHER`.
pub fn method_label(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::HEAD => "HEAD",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::OPTIONS => "OPTIONS",
        Method::PATCH => "PATCH",
        _ => "OTHER",
    }
}
