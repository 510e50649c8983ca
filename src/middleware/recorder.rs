//! Response capture for the logging interceptor.
//!
//! A [`ResponseRecorder`] remembers the status code and the number of body
//! bytes of one response. [`record`] attaches it to an axum [`Response`]: the
//! status goes through [`ResponseRecorder::write_header`] and the body is
//! re-wrapped so every data frame passes through [`ResponseRecorder::write`]
//! on its way to the client. Headers and bytes reach the client unchanged.

use std::sync::{
    atomic::{AtomicU16, AtomicU64, Ordering},
    Arc,
};

use axum::{
    body::Body,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures_util::StreamExt as _;

/// Sentinel for "no status recorded yet".
const UNSET: u16 = 0;

/// Status and byte count of one response.
///
/// Shared between the interceptor and the body stream, hence the atomics;
/// it is never shared across requests.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    status: AtomicU16,
    bytes: AtomicU64,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an explicit status. Only the first status sticks.
    pub fn write_header(&self, status: StatusCode) {
        let _ = self.status.compare_exchange(
            UNSET,
            status.as_u16(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    /// Record `len` body bytes, implying `200 OK` if no status was set yet.
    pub fn write(&self, len: usize) {
        self.write_header(StatusCode::OK);
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// The recorded status, `None` if nothing was ever written.
    pub fn status(&self) -> Option<StatusCode> {
        match self.status.load(Ordering::Relaxed) {
            UNSET => None,
            code => StatusCode::from_u16(code).ok(),
        }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Route `response` through `recorder`.
///
/// `on_drop` is moved into the body stream and dropped together with it: when
/// the body has been fully sent, or abandoned by the client. Callers use it as
/// the completion hook.
pub fn record<G>(response: Response, recorder: Arc<ResponseRecorder>, on_drop: G) -> Response
where
    G: Send + Sync + 'static,
{
    recorder.write_header(response.status());
    let headers_only = response_has_no_body(response.headers(), response.status());
    let (parts, body) = response.into_parts();

    if headers_only {
        drop(on_drop);
        return Response::from_parts(parts, body);
    }

    let stream = body.into_data_stream().map(move |chunk: Result<Bytes, axum::Error>| {
        let _hold = &on_drop;
        if let Ok(bytes) = &chunk {
            recorder.write(bytes.len());
        }
        chunk
    });
    Response::from_parts(parts, Body::from_stream(stream))
}

fn response_has_no_body(headers: &HeaderMap, status: StatusCode) -> bool {
    status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
        || headers
            .get(axum::http::header::CONTENT_LENGTH)
            .is_some_and(|v| v == "0")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use axum::body::to_bytes;
    use axum::response::IntoResponse;

    use super::*;

    #[test]
    fn first_write_implies_ok() {
        let rr = ResponseRecorder::new();
        rr.write(9);
        assert_eq!(rr.status(), Some(StatusCode::OK));
        assert_eq!(rr.bytes(), 9);
    }

    #[test]
    fn repeated_writes_accumulate_and_keep_first_status() {
        let rr = ResponseRecorder::new();
        rr.write(4);
        rr.write(6);
        rr.write_header(StatusCode::NOT_FOUND);
        assert_eq!(rr.bytes(), 10);
        assert_eq!(rr.status(), Some(StatusCode::OK));
    }

    #[test]
    fn explicit_status_before_write_wins() {
        let rr = ResponseRecorder::new();
        rr.write_header(StatusCode::NOT_FOUND);
        rr.write(3);
        assert_eq!(rr.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(rr.bytes(), 3);
    }

    #[test]
    fn untouched_recorder_has_no_status() {
        let rr = ResponseRecorder::new();
        assert_eq!(rr.status(), None);
        assert_eq!(rr.bytes(), 0);
    }

    struct Flag(Arc<AtomicBool>);

    impl Drop for Flag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn record_passes_body_through_and_counts_bytes() {
        let rr = Arc::new(ResponseRecorder::new());
        let dropped = Arc::new(AtomicBool::new(false));
        let response = (StatusCode::CREATED, "test response").into_response();

        let recorded = record(response, Arc::clone(&rr), Flag(Arc::clone(&dropped)));
        assert_eq!(recorded.status(), StatusCode::CREATED);

        let body = to_bytes(recorded.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"test response");
        assert_eq!(rr.bytes(), 13);
        assert_eq!(rr.status(), Some(StatusCode::CREATED));
        assert!(dropped.load(Ordering::SeqCst), "completion hook must fire");
    }

    #[tokio::test]
    async fn record_fires_hook_immediately_for_empty_responses() {
        let rr = Arc::new(ResponseRecorder::new());
        let dropped = Arc::new(AtomicBool::new(false));
        let response = StatusCode::NO_CONTENT.into_response();

        let _recorded = record(response, Arc::clone(&rr), Flag(Arc::clone(&dropped)));
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(rr.status(), Some(StatusCode::NO_CONTENT));
        assert_eq!(rr.bytes(), 0);
    }
}
