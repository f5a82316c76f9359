//! Wire representations.
//!
//! One response type per domain entity, each built by a single `From` impl.
//! Money is serialized as a decimal string (`"80.00"`).

use betzona::{
    Page,
    auth::{Role, User, UserStatus},
    fixtures::{Match, MatchStatus},
    ledger::{Bet, BetStatus, BetType},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub balance: Decimal,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            balance: user.balance,
            status: user.status,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResponse {
    pub id: i64,
    pub tournament_id: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub status: MatchStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub home_score: i32,
    pub away_score: i32,
    pub stadium: Option<String>,
    pub referee: Option<String>,
}

impl From<&Match> for MatchResponse {
    fn from(m: &Match) -> Self {
        Self {
            id: m.id,
            tournament_id: m.tournament_id,
            home_team_id: m.home_team_id,
            away_team_id: m.away_team_id,
            status: m.status,
            start_time: m.start_time,
            end_time: m.end_time,
            home_score: m.home_score,
            away_score: m.away_score,
            stadium: m.stadium.clone(),
            referee: m.referee.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetResponse {
    pub id: i64,
    pub user_id: i64,
    pub match_id: i64,
    pub bet_type: BetType,
    pub amount: Decimal,
    pub odds: Decimal,
    pub status: BetStatus,
    pub result: Option<String>,
    pub payout: Option<Decimal>,
    pub promotion_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Bet> for BetResponse {
    fn from(bet: &Bet) -> Self {
        Self {
            id: bet.id,
            user_id: bet.user_id,
            match_id: bet.match_id,
            bet_type: bet.bet_type,
            amount: bet.amount,
            odds: bet.odds,
            status: bet.status,
            result: bet.result.clone(),
            payout: bet.payout,
            promotion_id: bet.promotion_id,
            created_at: bet.created_at,
            updated_at: bet.updated_at,
        }
    }
}

/// Pagination metadata of a list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMeta {
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub offset: i64,
}

/// `{data, meta}` envelope of every list endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T> ListResponse<T> {
    pub fn from_page<D>(page: &Page<D>) -> Self
    where
        for<'a> T: From<&'a D>,
    {
        Self {
            data: page.items.iter().map(T::from).collect(),
            meta: PageMeta {
                total: page.total,
                page: page.pagination.page,
                limit: page.pagination.limit,
                offset: page.pagination.offset(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelBetResponse {
    pub message: String,
    pub bet: BetResponse,
    pub balance: Decimal,
}
