//! Request interceptors and the order they are applied in.
//!
//! [`CHAIN`] lists the interceptors from outermost to innermost. [`compose`]
//! folds that list over the application router once at startup, so the wrap
//! order is decided in exactly one place:
//!
//! ```text
//! metrics → session → logging → (panic guard) → handler
//! ```
//!
//! - metrics is outermost so requests rejected by the session interceptor are
//!   still counted, with their final status;
//! - session runs before logging so the request span can carry the session id;
//! - logging wraps the handler directly so its timing covers the business
//!   logic and nothing else.

pub mod logging;
pub mod metrics;
pub mod recorder;
pub mod route;
pub mod session;

use std::sync::Arc;

use axum::{middleware::from_fn, middleware::from_fn_with_state, Router};
use tower_http::catch_panic::CatchPanicLayer;

use crate::api::AppState;

/// One interceptor of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interceptor {
    Metrics,
    Session,
    Logging,
}

/// Outermost first.
pub const CHAIN: [Interceptor; 3] = [Interceptor::Metrics, Interceptor::Session, Interceptor::Logging];

impl Interceptor {
    fn wrap(self, app: Router, state: &Arc<AppState>) -> Router {
        match self {
            Self::Metrics => app.layer(from_fn_with_state(
                Arc::clone(state),
                metrics::metrics_middleware,
            )),
            Self::Session => app.layer(from_fn_with_state(
                Arc::clone(state),
                session::session_middleware,
            )),
            Self::Logging => app.layer(from_fn(logging::logging_middleware)),
        }
    }
}

/// Wrap `app` in every interceptor of [`CHAIN`].
///
/// `Router::layer` makes the most recently added layer the outermost one, so
/// the list is folded innermost first. A panic inside a handler becomes a
/// `500` before any interceptor sees it.
pub fn compose(app: Router, state: &Arc<AppState>) -> Router {
    CHAIN
        .iter()
        .rev()
        .fold(app.layer(CatchPanicLayer::new()), |app, interceptor| {
            interceptor.wrap(app, state)
        })
}
