//! Match handlers: public reads and admin scheduling.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use betzona::{
    Pagination,
    fixtures::{MatchFilter, MatchStatus, MatchUpdate, NewMatch},
};
use std::collections::HashMap;

use super::{
    AppState,
    error::ApiResult,
    query::{optional_param, parse_day_range},
    responses::{ListResponse, MatchResponse},
};

/// `GET /api/v1/matches`
///
/// Query parameters (all optional, combined with AND): `status`,
/// `tournament_id`, `team_id`, `start_date`, `end_date` (inclusive
/// `YYYY-MM-DD` days, UTC), `page`, `limit`.
pub async fn list_matches(
    State(state): State<AppState>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> ApiResult<Json<ListResponse<MatchResponse>>> {
    let Query(params) = query?;

    let (starts_from, ends_before) = parse_day_range(&params)?;
    let filter = MatchFilter {
        status: optional_param::<MatchStatus>(&params, "status")?,
        tournament_id: optional_param(&params, "tournament_id")?,
        team_id: optional_param(&params, "team_id")?,
        starts_from,
        ends_before,
    };
    let pagination = Pagination::from_query(
        params.get("page").map(String::as_str),
        params.get("limit").map(String::as_str),
    );

    let page = state.match_manager.list_matches(&filter, pagination).await?;
    Ok(Json(ListResponse::from_page(&page)))
}

/// `GET /api/v1/matches/{match_id}`
pub async fn get_match(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<MatchResponse>> {
    let Path(match_id) = path?;
    let m = state.match_manager.get_match(match_id).await?;
    Ok(Json(MatchResponse::from(&m)))
}

/// `POST /api/v1/admin/matches`
pub async fn create_match(
    State(state): State<AppState>,
    payload: Result<Json<NewMatch>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<MatchResponse>)> {
    let Json(new_match) = payload?;
    let m = state.match_manager.create_match(new_match).await?;
    Ok((StatusCode::CREATED, Json(MatchResponse::from(&m))))
}

/// `PATCH /api/v1/admin/matches/{match_id}`
pub async fn update_match(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<MatchUpdate>, JsonRejection>,
) -> ApiResult<Json<MatchResponse>> {
    let Path(match_id) = path?;
    let Json(update) = payload?;
    let m = state.match_manager.update_match(match_id, update).await?;
    Ok(Json(MatchResponse::from(&m)))
}

/// `DELETE /api/v1/admin/matches/{match_id}` (soft cancel)
pub async fn cancel_match(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<MatchResponse>> {
    let Path(match_id) = path?;
    let m = state.match_manager.cancel_match(match_id).await?;
    Ok(Json(MatchResponse::from(&m)))
}

