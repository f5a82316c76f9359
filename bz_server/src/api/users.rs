//! Account handlers: the caller's own profile and admin status changes.

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::{JsonRejection, PathRejection}},
};
use betzona::auth::{Identity, UserStatus};
use serde::Deserialize;

use super::{AppState, error::ApiResult, responses::UserResponse};

#[derive(Debug, Deserialize)]
pub struct StatusPayload {
    pub status: UserStatus,
}

/// `GET /api/v1/users/me`
pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<UserResponse>> {
    let user = state.auth_manager.get_user(identity.user_id).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// `PATCH /api/v1/admin/users/{user_id}/status` with `{"status": "blocked"}`
///
/// A blocked or inactive account is refused by the identity gate on its next
/// request, even with a token that has not expired.
pub async fn set_status(
    State(state): State<AppState>,
    Extension(admin): Extension<Identity>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<StatusPayload>, JsonRejection>,
) -> ApiResult<Json<UserResponse>> {
    let Path(user_id) = path?;
    let Json(payload) = payload?;

    let user = state.auth_manager.set_status(user_id, payload.status).await?;
    tracing::info!(
        admin_id = admin.user_id,
        user_id = user.id,
        status = %user.status,
        "Account status changed"
    );
    Ok(Json(UserResponse::from(&user)))
}
