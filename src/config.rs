//! Configuration types for shop-frontend.
//!
//! Config is loaded once at startup from a TOML file, overlaid with the
//! environment variables the deployment manifests set, and validated before
//! the server opens its port. A missing file is not an error: every field has
//! a default that matches the in-cluster service names.
//!
//! # Example
//! ```toml
//! [server]
//! port = 8080
//!
//! [session]
//! shared_session = false
//!
//! [rpc]
//! avoid_noop_currency_conversion = false
//!
//! [services]
//! currency = "http://currencyservice:7000"
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Environment flag that forces every client onto one fixed session id.
pub const SHARED_SESSION_ENV: &str = "ENABLE_SINGLE_SHARED_SESSION";

/// Top-level frontend configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub rpc: RpcConfig,

    /// Base addresses of the backend services.
    #[serde(default)]
    pub services: ServicesConfig,
}

impl Config {
    /// Load the config file at `path`, apply environment overrides and validate.
    ///
    /// A non-existent file yields the default config (still subject to
    /// environment overrides).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config: Self = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&content).context("parsing config TOML")?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from the environment.
    ///
    /// `lookup` is injected so tests never have to mutate the process env.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT").and_then(|v| v.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(flag) = lookup(SHARED_SESSION_ENV) {
            self.session.shared_session = flag == "true";
        }

        let s = &mut self.services;
        let overrides: [(&str, &mut String); 6] = [
            ("PRODUCT_CATALOG_SERVICE_ADDR", &mut s.product_catalog),
            ("CURRENCY_SERVICE_ADDR", &mut s.currency),
            ("CART_SERVICE_ADDR", &mut s.cart),
            ("RECOMMENDATION_SERVICE_ADDR", &mut s.recommendation),
            ("SHIPPING_SERVICE_ADDR", &mut s.shipping),
            ("AD_SERVICE_ADDR", &mut s.ad),
        ];
        for (var, slot) in overrides {
            if let Some(addr) = lookup(var).filter(|v| !v.is_empty()) {
                *slot = addr;
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.server.port != 0, "server.port must be nonzero");
        anyhow::ensure!(
            self.session.max_age_secs > 0,
            "session.max_age_secs must be positive"
        );

        for (name, addr) in self.services.iter() {
            anyhow::ensure!(
                addr.starts_with("http://") || addr.starts_with("https://"),
                "service `{name}` address `{addr}` must be an http:// or https:// URL"
            );
        }
        Ok(())
    }
}

/// Listener and log output settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen port (default: 8080). `PORT` overrides it.
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// `text` (default) or `json` log lines.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: defaults::port(),
            log_format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Session cookie behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Hand every new client the same fixed session id instead of a random one.
    ///
    /// Used for load tests that want a single shared cart. Overridden by
    /// `ENABLE_SINGLE_SHARED_SESSION=true`.
    #[serde(default)]
    pub shared_session: bool,

    /// `Max-Age` of the session cookie in seconds (default: 48 h).
    #[serde(default = "defaults::max_age_secs")]
    pub max_age_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shared_session: false,
            max_age_secs: defaults::max_age_secs(),
        }
    }
}

/// Behaviour of the backend RPC facade.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RpcConfig {
    /// Skip the currency conversion call when source and target codes match.
    ///
    /// Off by default so every conversion is visible to the currency service.
    #[serde(default)]
    pub avoid_noop_currency_conversion: bool,

    /// Optional transport timeout of the shared HTTP client in milliseconds.
    ///
    /// Unset by default: calls inherit the caller's deadline, and only the ad
    /// call imposes one of its own.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Base URLs of the backend services.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServicesConfig {
    #[serde(default = "defaults::product_catalog")]
    pub product_catalog: String,
    #[serde(default = "defaults::currency")]
    pub currency: String,
    #[serde(default = "defaults::cart")]
    pub cart: String,
    #[serde(default = "defaults::recommendation")]
    pub recommendation: String,
    #[serde(default = "defaults::shipping")]
    pub shipping: String,
    #[serde(default = "defaults::ad")]
    pub ad: String,
}

impl ServicesConfig {
    /// Every configured address paired with its config key.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("product_catalog", self.product_catalog.as_str()),
            ("currency", self.currency.as_str()),
            ("cart", self.cart.as_str()),
            ("recommendation", self.recommendation.as_str()),
            ("shipping", self.shipping.as_str()),
            ("ad", self.ad.as_str()),
        ]
        .into_iter()
    }

    /// Point every service at the same base URL. Handy for tests.
    #[cfg(test)]
    pub fn all_at(base: &str) -> Self {
        Self {
            product_catalog: base.into(),
            currency: base.into(),
            cart: base.into(),
            recommendation: base.into(),
            shipping: base.into(),
            ad: base.into(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            product_catalog: defaults::product_catalog(),
            currency: defaults::currency(),
            cart: defaults::cart(),
            recommendation: defaults::recommendation(),
            shipping: defaults::shipping(),
            ad: defaults::ad(),
        }
    }
}

mod defaults {
    pub fn port() -> u16 { 8080 }
    pub fn max_age_secs() -> u64 { 60 * 60 * 48 }
    pub fn product_catalog() -> String { "http://productcatalogservice:3550".into() }
    pub fn currency() -> String { "http://currencyservice:7000".into() }
    pub fn cart() -> String { "http://cartservice:7070".into() }
    pub fn recommendation() -> String { "http://recommendationservice:8080".into() }
    pub fn shipping() -> String { "http://shippingservice:50051".into() }
    pub fn ad() -> String { "http://adservice:9555".into() }
}
