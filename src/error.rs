//! Error type returned by the storefront handlers.
//!
//! [`AppError`] wraps [`anyhow::Error`] together with the status it should be
//! answered with. Backend failures ([`RpcError`](crate::rpc::RpcError),
//! [`AggregateError`](crate::aggregate::AggregateError)) and money arithmetic
//! errors convert through `?` and become a `500`; input validation uses
//! [`AppError::bad_request`].
//!
//! Error responses carry an [`ErrorType`] extension so the metrics
//! interceptor can count them by kind without seeing the error itself.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn product(
//!     State(state): State<Arc<AppState>>,
//!     Path(id): Path<String>,
//! ) -> Result<Json<Value>, AppError> {
//!     let product = state.shop.get_product(&id).await?;
//!     Ok(Json(json!({ "product": product })))
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{aggregate::AggregateError, rpc::RpcError};

/// `error_type` label of `frontend_errors_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// The request itself was unacceptable.
    Validation,
    /// A backend call failed.
    Backend,
    Internal,
}

impl ErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::Backend => "grpc_error",
            Self::Internal => "internal_error",
        }
    }
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    source: anyhow::Error,
}

impl AppError {
    /// Reject a request whose input is unacceptable.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            source: anyhow::Error::msg(message.into()),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn error_type(&self) -> ErrorType {
        if self.status.is_client_error() {
            return ErrorType::Validation;
        }
        let backend = self
            .source
            .chain()
            .any(|e| e.is::<RpcError>() || e.is::<AggregateError>());
        if backend {
            ErrorType::Backend
        } else {
            ErrorType::Internal
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_type = self.error_type();
        if self.status.is_server_error() {
            tracing::warn!(
                error = %format!("{:#}", self.source),
                error_type = error_type.as_str(),
                "request failed"
            );
        } else {
            tracing::debug!(error = %self.source, status = self.status().as_u16(), "request rejected");
        }
        let mut response = (
            self.status,
            Json(json!({ "error": self.source.to_string() })),
        )
            .into_response();
        response.extensions_mut().insert(error_type);
        response
    }
}

/// Anything convertible to [`anyhow::Error`] is an internal error.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(e: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            source: e.into(),
        }
    }
}
