//! Mapping of dispatch errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use spindle_core::DispatchError;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

/// A [`DispatchError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub DispatchError);

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
            DispatchError::InvalidState(_)
            | DispatchError::InvalidTransition { .. }
            | DispatchError::Conflict(_) => StatusCode::CONFLICT,
            DispatchError::PreconditionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DispatchError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            DispatchError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Shorthand for a malformed query parameter.
    pub fn bad_parameter(message: impl Into<String>) -> Self {
        Self(DispatchError::PreconditionFailed(message.into()))
    }
}

impl From<DispatchError> for ApiError {
    fn from(error: DispatchError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.0.is_fatal() {
            tracing::error!(error = %self.0, "Storage failure while handling request");
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.0.kind(),
        };
        (status, Json(body)).into_response()
    }
}
