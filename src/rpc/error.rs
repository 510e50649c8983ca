use std::fmt;

/// The backend services the frontend talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    ProductCatalog,
    Currency,
    Cart,
    Recommendation,
    Shipping,
    Ad,
}

impl Service {
    /// Service name as used in the RPC path and in metric labels.
    pub fn name(self) -> &'static str {
        match self {
            Self::ProductCatalog => "ProductCatalogService",
            Self::Currency => "CurrencyService",
            Self::Cart => "CartService",
            Self::Recommendation => "RecommendationService",
            Self::Shipping => "ShippingService",
            Self::Ad => "AdService",
        }
    }

    /// Whether the service only enriches a page. Pages render without it.
    pub fn is_optional(self) -> bool {
        matches!(self, Self::Recommendation | Self::Ad)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure of a single backend call.
///
/// Every variant names the service and method so the message alone tells an
/// operator which call failed. The underlying client or codec error is part
/// of the message and not exposed again as a source.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("{service}/{method}: transport failure: {error}")]
    Transport {
        service: Service,
        method: &'static str,
        error: reqwest::Error,
    },

    #[error("{service}/{method}: backend returned HTTP {status}: {body}")]
    Status {
        service: Service,
        method: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("{service}/{method}: undecodable response: {error}")]
    Decode {
        service: Service,
        method: &'static str,
        error: serde_json::Error,
    },

    #[error("{service}/{method}: response lacks required field {field}")]
    MissingField {
        service: Service,
        method: &'static str,
        field: &'static str,
    },

    #[error("{service}/{method}: deadline of {timeout_ms} ms exceeded")]
    Timeout {
        service: Service,
        method: &'static str,
        timeout_ms: u64,
    },
}

impl RpcError {
    pub fn service(&self) -> Service {
        match self {
            Self::Transport { service, .. }
            | Self::Status { service, .. }
            | Self::Decode { service, .. }
            | Self::MissingField { service, .. }
            | Self::Timeout { service, .. } => *service,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Self::Transport { method, .. }
            | Self::Status { method, .. }
            | Self::Decode { method, .. }
            | Self::MissingField { method, .. }
            | Self::Timeout { method, .. } => method,
        }
    }

    /// True when the failed call was optional enrichment (ads, recommendations).
    pub fn is_optional(&self) -> bool {
        self.service().is_optional()
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
