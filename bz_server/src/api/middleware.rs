//! Authentication middleware for protected endpoints.
//!
//! [`auth_middleware`] resolves the bearer token to an [`Identity`] and puts it
//! into the request extensions; [`require_admin`] sits behind it on the admin
//! routes.
//!
//! # Extracting the identity
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//! use betzona::auth::Identity;
//!
//! async fn protected_handler(Extension(identity): Extension<Identity>) -> String {
//!     format!("Authenticated as user {}", identity.user_id)
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use betzona::auth::{AuthError, Identity};

use super::{AppState, error::ApiError, rate_limiter::ClientIp};
use crate::logging;

/// Validate `Authorization: Bearer <token>` and inject the caller's [`Identity`].
///
/// - Missing, malformed, expired or unknown token: `401 Unauthorized`
/// - Account inactive or blocked: `403 Forbidden`
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Missing or invalid token"))?;

    let identity = match state.auth_manager.resolve_identity(token).await {
        Ok(identity) => identity,
        Err(AuthError::AccountDisabled(status)) => {
            let ip = request.extensions().get::<ClientIp>().map(|c| c.0.as_str());
            logging::log_security_event(
                "disabled_account_access",
                None,
                ip,
                &format!("Request with token of {status} account"),
            );
            return Err(ApiError::forbidden(format!("Account is {status}")));
        }
        Err(AuthError::Database(e)) => return Err(ApiError::internal(e)),
        Err(AuthError::Timeout(t)) => return Err(ApiError::internal(t)),
        Err(_) => return Err(ApiError::unauthorized("Invalid or expired token")),
    };

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Reject callers whose identity is not an admin. Must run after [`auth_middleware`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    match request.extensions().get::<Identity>() {
        Some(identity) if identity.is_admin() => Ok(next.run(request).await),
        Some(identity) => {
            logging::log_security_event(
                "admin_access_denied",
                Some(identity.user_id),
                None,
                &format!("Non-admin request to {}", request.uri().path()),
            );
            Err(ApiError::forbidden("Admin role required"))
        }
        None => Err(ApiError::unauthorized("Missing or invalid token")),
    }
}
