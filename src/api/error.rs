//! HTTP status mapping for domain errors.
//!
//! Credential failures and rate limiting are 403, missing or unusable
//! sessions are 401, everything server-side is an opaque 500.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::error::{AuthError, TxError};

const INTERNAL_MESSAGE: &str = "Internal server error";

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if self.is_internal() {
            error!("Request failed: {self:?}");
            return (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string()).into_response();
        }

        let status = match &self {
            Self::InvalidCredentials | Self::EmailNotVerified | Self::RateLimited { .. } => {
                StatusCode::FORBIDDEN
            }
            _ => StatusCode::UNAUTHORIZED,
        };
        let mut response = (status, self.to_string()).into_response();
        if let Self::RateLimited { retry_after } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

impl IntoResponse for TxError {
    fn into_response(self) -> Response {
        if let Self::Commit {
            rollback_failure: Some(rollback),
            ..
        } = &self
        {
            error!("Rollback after failed commit also failed: {rollback:?}");
        }
        error!("Transaction group failed: {self:?}");
        (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string()).into_response()
    }
}
