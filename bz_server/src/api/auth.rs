//! Authentication API handlers.
//!
//! Register:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/auth/register \
//!   -H "Content-Type: application/json" \
//!   -d '{"name": "Player One", "email": "player@example.com", "password": "SecurePass123"}'
//! ```
//!
//! Login:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/auth/login \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "player@example.com", "password": "SecurePass123"}'
//! ```

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use betzona::auth::{AuthError, LoginRequest, RegisterRequest};

use super::{
    AppState,
    error::{ApiError, ApiResult},
    rate_limiter::ClientIp,
    responses::{LoginResponse, UserResponse},
};
use crate::{logging, metrics};

/// Register a new account.
///
/// Returns `201 Created` with the user. The role is `admin` only for emails
/// listed in `ADMIN_EMAILS`; the balance is the configured starting balance.
///
/// # Errors
///
/// - `400`: Invalid name, email or weak password
/// - `409`: Email already registered
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let Json(request) = payload?;
    let user = state.auth_manager.register(request).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

/// Authenticate and issue a bearer token.
///
/// # Response
///
/// ```json
/// {
///   "token": "eyJhbGciOiJIUzI1NiIs...",
///   "token_type": "Bearer",
///   "expires_in": 86400,
///   "user": { "id": 42, "email": "player@example.com", ... }
/// }
/// ```
///
/// # Errors
///
/// - `401`: Unknown email or wrong password (indistinguishable)
/// - `403`: Account inactive or blocked
pub async fn login(
    State(state): State<AppState>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(request) = payload?;
    let email = request.email.clone();

    match state.auth_manager.login(request).await {
        Ok((user, token)) => {
            metrics::login_attempts_total(true);
            Ok(Json(LoginResponse {
                token,
                token_type: "Bearer".to_string(),
                expires_in: state.auth_manager.token_duration_secs(),
                user: UserResponse::from(&user),
            }))
        }
        Err(e) => {
            metrics::login_attempts_total(false);
            if matches!(e, AuthError::InvalidCredentials | AuthError::AccountDisabled(_)) {
                logging::log_security_event(
                    "failed_login",
                    None,
                    Some(&ip),
                    &format!("Login failed for {email}: {e}"),
                );
            }
            Err(ApiError::from(e))
        }
    }
}
