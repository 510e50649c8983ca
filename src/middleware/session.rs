//! Session cookie interceptor.
//!
//! Every request leaves this middleware with a [`SessionId`] extension. The
//! value comes from the `shop_session-id` cookie when the browser sent a well
//! formed one; otherwise a new id is issued, returned in a `Set-Cookie`
//! header and counted as a new session.
//!
//! In shared-session mode every new client receives the same fixed id so load
//! generators can drive a single cart.
//!
//! A `Cookie` header that cannot be read at all (non visible-ASCII bytes) is
//! rejected with `400` before anything downstream runs.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::{api::AppState, context::SessionId, error::ErrorType};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "shop_session-id";

/// The id handed out to every new client in shared-session mode.
pub const SHARED_SESSION_ID: &str = "12345678-1234-1234-1234-123456789123";

/// Failure to read the cookie header at all. "No cookie" is not an error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cookie header is not valid visible ASCII")]
    MalformedCookieHeader,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "rejecting request");
        let mut response = (StatusCode::BAD_REQUEST, self.to_string()).into_response();
        response.extensions_mut().insert(ErrorType::Validation);
        response
    }
}

/// Find the value of cookie `name` across all `Cookie` headers.
///
/// `Ok(None)` means the cookie is simply not there.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, SessionError> {
    for value in headers.get_all(header::COOKIE) {
        let raw = value
            .to_str()
            .map_err(|_| SessionError::MalformedCookieHeader)?;
        let found = raw
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| unquote(v));
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

/// Strip one pair of surrounding double quotes, only when both are there.
fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Whether a cookie value is usable as a session id.
///
/// Empty values and anything outside the RFC 6265 cookie-octet set are
/// rejected so they get replaced by a fresh id instead of being passed on.
pub fn is_valid_session_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 128
        && value
            .bytes()
            .all(|b| matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E))
}

/// Axum middleware: guarantees a [`SessionId`] extension on every request.
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let existing = match read_cookie(req.headers(), SESSION_COOKIE) {
        Ok(v) => v.filter(|v| is_valid_session_id(v)).map(str::to_owned),
        Err(e) => return e.into_response(),
    };

    let (session_id, issued) = match existing {
        Some(id) => (id, false),
        None => {
            let id = if state.config.session.shared_session {
                SHARED_SESSION_ID.to_owned()
            } else {
                Uuid::new_v4().to_string()
            };
            state.metrics.record_new_session();
            (id, true)
        }
    };

    req.extensions_mut().insert(SessionId(session_id.clone()));
    let mut response = next.run(req).await;

    if issued {
        let cookie = format!(
            "{SESSION_COOKIE}={session_id}; Path=/; Max-Age={}",
            state.config.session.max_age_secs
        );
        match HeaderValue::from_str(&cookie) {
            Ok(v) => {
                response.headers_mut().append(header::SET_COOKIE, v);
            }
            Err(e) => tracing::error!(error = %e, "session cookie not representable"),
        }
    }

    response
}
