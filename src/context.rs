//! Per-request context values.
//!
//! The interceptors store their values as typed request extensions: the
//! session assigner inserts a [`SessionId`], the logging interceptor a
//! [`RequestId`] and a [`RequestSpan`]. Lookups return `Option` because a
//! missing value upstream of its producer is a normal state.
//!
//! Terminal handlers take the bundled [`RequestContext`] extractor instead of
//! the individual extensions. It fails with `500` when any value is absent,
//! which only happens when the middleware chain was assembled wrong.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, Extensions, StatusCode},
};

/// Unique id of one request, generated by the logging interceptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Stable per-browser session id, assigned by the session interceptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionId(pub String);

/// The request-scoped logger: a span carrying path, method, request id and
/// (when known) the session id.
#[derive(Clone, Debug)]
pub struct RequestSpan(pub tracing::Span);

impl RequestId {
    pub fn from_extensions(ext: &Extensions) -> Option<&Self> {
        ext.get::<Self>()
    }
}

impl SessionId {
    pub fn from_extensions(ext: &Extensions) -> Option<&Self> {
        ext.get::<Self>()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl RequestSpan {
    pub fn from_extensions(ext: &Extensions) -> Option<&Self> {
        ext.get::<Self>()
    }
}

/// Insert `value` unless an upstream interceptor already set one.
///
/// Returns `false` (and leaves the existing value untouched) when the key was
/// already present.
pub fn insert_once<T: Clone + Send + Sync + 'static>(ext: &mut Extensions, value: T) -> bool {
    if ext.get::<T>().is_some() {
        return false;
    }
    ext.insert(value);
    true
}

/// Everything the chain guarantees to a terminal handler.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub session_id: SessionId,
    pub span: tracing::Span,
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ext = &parts.extensions;
        match (
            RequestId::from_extensions(ext),
            SessionId::from_extensions(ext),
            RequestSpan::from_extensions(ext),
        ) {
            (Some(request_id), Some(session_id), Some(span)) => Ok(Self {
                request_id: request_id.clone(),
                session_id: session_id.clone(),
                span: span.0.clone(),
            }),
            _ => {
                tracing::error!("request context incomplete; middleware chain mis-assembled");
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "request context missing",
                ))
            }
        }
    }
}
