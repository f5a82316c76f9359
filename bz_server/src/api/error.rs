//! API error type and its JSON payload.
//!
//! Every handler and middleware fails with [`ApiError`], which renders as
//!
//! ```json
//! {"status": 409, "error": "conflict", "message": "...", "correlation_id": null}
//! ```
//!
//! Internal errors never expose their cause; the payload carries the request
//! id instead, and the cause is logged under that id.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use betzona::{auth::AuthError, fixtures::MatchError, ledger::LedgerError};
use serde::Serialize;
use std::time::Duration;

use super::request_id;

/// Error category, one per HTTP status the API produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    InsufficientFunds,
    InvalidState,
    RateLimited,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Internal => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            ErrorKind::InvalidState => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Structured API error
#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    retry_after: Option<Duration>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub error: &'static str,
    pub message: String,
    pub correlation_id: Option<String>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        Self {
            retry_after: Some(retry_after),
            ..Self::new(ErrorKind::RateLimited, "Too many requests")
        }
    }

    /// Log `cause` under the current request id and hide it from the client
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        tracing::error!(
            request_id = request_id::current().as_deref().unwrap_or("-"),
            "Internal error: {cause}"
        );
        Self::new(ErrorKind::Internal, "Internal server error")
    }

    /// Like [`ApiError::internal`], logged as a warning for transient failures
    pub fn transient(cause: impl std::fmt::Display) -> Self {
        tracing::warn!(
            request_id = request_id::current().as_deref().unwrap_or("-"),
            "Transient error: {cause}"
        );
        Self::new(ErrorKind::Internal, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        let correlation_id = match self.kind {
            ErrorKind::Internal => request_id::current(),
            _ => None,
        };

        let body = ErrorBody {
            status: status.as_u16(),
            error: self.kind.as_str(),
            message: self.message,
            correlation_id,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(retry_after) = self.retry_after {
            // Round up so clients never retry early
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let kind = match &err {
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::Forbidden(_) => ErrorKind::Forbidden,
            LedgerError::Conflict(_) => ErrorKind::Conflict,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::InvalidState(_) => ErrorKind::InvalidState,
            LedgerError::Database(_) | LedgerError::Timeout(_) | LedgerError::Internal(_) => {
                return if err.is_retryable() {
                    Self::transient(err)
                } else {
                    Self::internal(err)
                };
            }
        };
        Self::new(kind, err.client_message())
    }
}

impl From<MatchError> for ApiError {
    fn from(err: MatchError) -> Self {
        let kind = match &err {
            MatchError::Validation(_) => ErrorKind::Validation,
            MatchError::NotFound(_) => ErrorKind::NotFound,
            MatchError::ScheduleConflict { .. } => ErrorKind::Conflict,
            MatchError::InvalidState(_) => ErrorKind::InvalidState,
            MatchError::Database(_) | MatchError::Timeout(_) => return Self::internal(err),
        };
        Self::new(kind, err.client_message())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let kind = match &err {
            AuthError::InvalidName(_)
            | AuthError::InvalidEmail(_)
            | AuthError::WeakPassword(_)
            | AuthError::InvalidValue(_) => ErrorKind::Validation,
            AuthError::InvalidCredentials | AuthError::MissingToken | AuthError::JwtError(_) => {
                ErrorKind::Unauthorized
            }
            AuthError::AccountDisabled(_) => ErrorKind::Forbidden,
            AuthError::UserNotFound => ErrorKind::NotFound,
            AuthError::EmailTaken => ErrorKind::Conflict,
            AuthError::Database(_) | AuthError::Timeout(_) | AuthError::HashingFailed => {
                return Self::internal(err);
            }
        };
        Self::new(kind, err.client_message())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

/// Result alias for handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ledger_error_mapping() {
        let cases = [
            (LedgerError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (LedgerError::NotFound("Bet"), StatusCode::NOT_FOUND),
            (LedgerError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (LedgerError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                LedgerError::InsufficientFunds {
                    available: dec!(1),
                    required: dec!(2),
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (LedgerError::InvalidState("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (LedgerError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).kind.status(), status);
        }
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err = ApiError::from(LedgerError::Internal("connection reset by peer".into()));
        assert_eq!(err.message, "Internal server error");
    }

    #[test]
    fn test_transient_ledger_error_is_still_500() {
        let err = ApiError::from(LedgerError::Timeout("5s".into()));
        assert_eq!(err.kind, ErrorKind::Internal);
        assert_eq!(err.message, "Internal server error");
    }

    #[test]
    fn test_auth_error_mapping() {
        assert_eq!(
            ApiError::from(AuthError::InvalidCredentials).kind,
            ErrorKind::Unauthorized
        );
        assert_eq!(ApiError::from(AuthError::EmailTaken).kind, ErrorKind::Conflict);
        assert_eq!(
            ApiError::from(AuthError::AccountDisabled("blocked".into())).kind,
            ErrorKind::Forbidden
        );
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::rate_limited(Duration::from_millis(1500)).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "2");
    }
}
