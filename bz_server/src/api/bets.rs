//! Bet handlers. All routes act on the authenticated caller's own bets.
//!
//! Place a bet:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/bets \
//!   -H "Authorization: Bearer <token>" \
//!   -H "Content-Type: application/json" \
//!   -d '{"match_id": 10, "bet_type": "win", "amount": "20.00", "odds": "2.50"}'
//! ```

use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use betzona::{
    Pagination,
    auth::Identity,
    ledger::{BetFilter, BetStatus, BetType, PlaceBetRequest},
};
use std::collections::HashMap;

use super::{
    AppState,
    error::ApiResult,
    query::{optional_param, parse_dates},
    responses::{BetResponse, CancelBetResponse, ListResponse},
};
use crate::{cache, logging, metrics};

/// `POST /api/v1/bets`
///
/// # Errors
///
/// - `400`: Invalid amount, odds or bet type
/// - `402`: Balance below the stake
/// - `404`: Unknown match
/// - `409`: A pending bet on this match already exists
/// - `422`: Match not open for betting
pub async fn place_bet(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<PlaceBetRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BetResponse>)> {
    let Json(request) = payload?;

    let bet = state
        .bet_manager
        .place_bet(identity.user_id, request)
        .await?;
    state.cache.invalidate_user(identity.user_id);

    metrics::bets_placed_total(bet.bet_type.as_str());
    metrics::bet_stake_amount(bet.amount);
    logging::log_ledger_event(
        "bet_placed",
        identity.user_id,
        bet.id,
        bet.amount,
        None,
    );

    Ok((StatusCode::CREATED, Json(BetResponse::from(&bet))))
}

/// `GET /api/v1/bets`
///
/// Query parameters (all optional, combined with AND): `status`, `match_id`,
/// `bet_type`, `start_date`, `end_date` (inclusive `YYYY-MM-DD` days, UTC),
/// `page`, `limit`.
pub async fn list_bets(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> ApiResult<Json<ListResponse<BetResponse>>> {
    let Query(params) = query?;

    let (from_date, to_date) = parse_dates(&params)?;
    let filter = BetFilter {
        status: optional_param::<BetStatus>(&params, "status")?,
        match_id: optional_param(&params, "match_id")?,
        bet_type: optional_param::<BetType>(&params, "bet_type")?,
        from_date,
        to_date,
    };
    let pagination = Pagination::from_query(
        params.get("page").map(String::as_str),
        params.get("limit").map(String::as_str),
    );

    let key = cache::user_bets_key(identity.user_id, &params);
    if let Some(cached) = state.cache.get::<ListResponse<BetResponse>>(&key) {
        return Ok(Json(cached));
    }
    let generation = state.cache.generation(identity.user_id);

    let page = state
        .bet_manager
        .list_bets(identity.user_id, &filter, pagination)
        .await?;
    let response = ListResponse::from_page(&page);
    state
        .cache
        .insert_if_current(identity.user_id, generation, key, &response);
    Ok(Json(response))
}

/// `GET /api/v1/bets/{bet_id}`
///
/// Another user's bet is reported as `404`.
pub async fn get_bet(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<BetResponse>> {
    let Path(bet_id) = path?;

    let key = cache::bet_key(identity.user_id, bet_id);
    if let Some(cached) = state.cache.get::<BetResponse>(&key) {
        return Ok(Json(cached));
    }
    let generation = state.cache.generation(identity.user_id);

    let bet = state.bet_manager.get_bet(identity.user_id, bet_id).await?;
    let response = BetResponse::from(&bet);
    state
        .cache
        .insert_if_current(identity.user_id, generation, key, &response);
    Ok(Json(response))
}

/// `DELETE /api/v1/bets/{bet_id}`
///
/// Refunds the full stake and returns the bet with the balance after refund.
///
/// # Errors
///
/// - `403`: Bet belongs to another user
/// - `404`: Unknown bet
/// - `422`: Bet not pending, or its match already started
pub async fn cancel_bet(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<CancelBetResponse>> {
    let Path(bet_id) = path?;

    let cancelled = state
        .bet_manager
        .cancel_bet(identity.user_id, bet_id)
        .await?;
    state.cache.invalidate_user(identity.user_id);

    metrics::bets_cancelled_total();
    logging::log_ledger_event(
        "bet_cancelled",
        identity.user_id,
        cancelled.bet.id,
        cancelled.bet.amount,
        Some(cancelled.balance_after),
    );

    Ok(Json(CancelBetResponse {
        message: "Bet cancelled".to_string(),
        bet: BetResponse::from(&cancelled.bet),
        balance: cancelled.balance_after,
    }))
}
