//! Liveness check.

/// `GET /_healthz`: always `200 ok`.
///
/// Touches no backend, so a slow dependency never fails the check.
pub async fn healthz() -> &'static str {
    "ok"
}
