//! Request logging interceptor.
//!
//! Every request passing through is given:
//!
//! - A fresh [`RequestId`] (UUID v4), echoed back in `X-Request-ID`
//! - A [`RequestSpan`] carrying `http.req.path`, `http.req.method`,
//!   `http.req.id` and, when the session interceptor ran first, `session`
//!
//! The wrapped handler runs inside that span, so every log line it emits is
//! tagged with the request metadata. A completion line with the elapsed time,
//! final status and byte count is written by [`CompletionLog`] when it is
//! dropped, which happens after the body has been sent, when the client goes
//! away mid-body, or while unwinding from a panic downstream.

use std::{sync::Arc, time::Instant};

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::Instrument as _;
use uuid::Uuid;

use crate::{
    context::{insert_once, RequestId, RequestSpan, SessionId},
    middleware::recorder::{self, ResponseRecorder},
};

/// Axum middleware that attaches a request id and a request-scoped span.
///
/// Must run **inside** the session interceptor, otherwise the span cannot
/// carry the session id.
pub async fn logging_middleware(mut req: Request, next: Next) -> Response {
    let id = Uuid::new_v4().to_string();
    let span = tracing::debug_span!(
        "request",
        http.req.path = %req.uri().path(),
        http.req.method = %req.method(),
        http.req.id = %id,
        session = tracing::field::Empty,
    );
    if let Some(session) = SessionId::from_extensions(req.extensions()) {
        span.record("session", session.as_str());
    }

    let recorder = Arc::new(ResponseRecorder::new());
    let completion = CompletionLog {
        span: span.clone(),
        started: Instant::now(),
        recorder: Arc::clone(&recorder),
    };

    insert_once(req.extensions_mut(), RequestId(id.clone()));
    insert_once(req.extensions_mut(), RequestSpan(span.clone()));

    span.in_scope(|| tracing::debug!("request started"));
    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert("x-request-id", header_value);
    }

    recorder::record(response, recorder, completion)
}

/// Writes the "request complete" line when dropped.
struct CompletionLog {
    span: tracing::Span,
    started: Instant,
    recorder: Arc<ResponseRecorder>,
}

impl Drop for CompletionLog {
    fn drop(&mut self) {
        let took_ms = self.started.elapsed().as_millis() as u64;
        let status = self.recorder.status().map_or(0, |s| s.as_u16());
        let bytes = self.recorder.bytes();
        self.span.in_scope(|| {
            tracing::debug!(
                http.resp.took_ms = took_ms,
                http.resp.status = status,
                http.resp.bytes = bytes,
                "request complete"
            );
        });
    }
}
