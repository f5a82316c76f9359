//! Repository trait definitions and their PostgreSQL implementations.
//!
//! Managers depend on these traits rather than on a pool, so the same
//! business rules run against [`super::MemoryStore`] in tests.
//!
//! The two mutating ledger calls, [`BetRepository::place_bet`] and
//! [`BetRepository::cancel_bet`], are units of work: an implementation must
//! apply the balance change and the bet change together or not at all, and
//! must re-check the balance, the match eligibility window and the
//! one-pending-bet-per-match rule inside that unit.
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use std::str::FromStr;

use super::timeouts::{with_default_timeout, with_transaction_timeout};
use crate::{
    Page, Pagination,
    auth::{AuthError, AuthResult, NewUser, User, UserCredentials, UserId, UserStatus},
    fixtures::{Match, MatchError, MatchFilter, MatchId, MatchResult, NewMatch},
    ledger::{
        Account, Bet, BetFilter, BetId, CancelledBet, LedgerError, LedgerResult, NewBet,
        messages,
    },
};

/// Trait for user/authentication repository operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user; fails with `EmailTaken` on a duplicate email
    async fn create_user(&self, user: NewUser) -> AuthResult<User>;

    /// Find user and password hash by (normalized) email
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<UserCredentials>>;

    /// Find user by ID
    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>>;

    /// Change account status, returning the updated user
    async fn update_status(&self, user_id: UserId, status: UserStatus)
    -> AuthResult<Option<User>>;
}

/// Trait for match repository operations
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Insert a match in `scheduled` status
    async fn create_match(&self, new_match: NewMatch) -> MatchResult<Match>;

    /// Find match by ID
    async fn find_match(&self, match_id: MatchId) -> MatchResult<Option<Match>>;

    /// First non-cancelled match involving one of `team_ids` whose window
    /// intersects `[start, end]`, ignoring `exclude`
    async fn find_overlapping(
        &self,
        team_ids: [i64; 2],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<MatchId>,
    ) -> MatchResult<Option<Match>>;

    /// Filtered page of matches, most recent start first
    async fn list_matches(
        &self,
        filter: &MatchFilter,
        pagination: Pagination,
    ) -> MatchResult<Page<Match>>;

    /// Persist all mutable fields of `m`
    async fn save_match(&self, m: &Match) -> MatchResult<Match>;
}

/// Trait for bet ledger repository operations
#[async_trait]
pub trait BetRepository: Send + Sync {
    /// Balance view of a user
    async fn find_account(&self, user_id: UserId) -> LedgerResult<Option<Account>>;

    /// Find bet by ID regardless of owner
    async fn find_bet(&self, bet_id: BetId) -> LedgerResult<Option<Bet>>;

    /// Find bet by ID, only if owned by `user_id`
    async fn find_user_bet(&self, user_id: UserId, bet_id: BetId) -> LedgerResult<Option<Bet>>;

    /// Whether the user already holds a pending bet on the match
    async fn has_pending_bet(&self, user_id: UserId, match_id: MatchId) -> LedgerResult<bool>;

    /// Filtered page of a user's bets, most recent first
    async fn list_bets(
        &self,
        user_id: UserId,
        filter: &BetFilter,
        pagination: Pagination,
    ) -> LedgerResult<Page<Bet>>;

    /// Debit the stake and insert a pending bet as one unit of work
    async fn place_bet(&self, bet: NewBet, now: DateTime<Utc>) -> LedgerResult<Bet>;

    /// Mark a pending bet cancelled and credit the stake as one unit of work
    async fn cancel_bet(
        &self,
        user_id: UserId,
        bet_id: BetId,
        now: DateTime<Utc>,
    ) -> LedgerResult<CancelledBet>;
}

const USER_COLUMNS: &str = "id, name, email, role, balance, status, created_at, updated_at";

const MATCH_COLUMNS: &str = "id, tournament_id, home_team_id, away_team_id, status, start_time, \
     end_time, home_score, away_score, stadium, referee, created_at, updated_at";

const BET_COLUMNS: &str = "id, user_id, match_id, bet_type, amount, odds, status, result, \
     payout, promotion_id, created_at, updated_at";

fn parse_column<T: FromStr<Err = String>>(row: &PgRow, column: &str) -> Result<T, String> {
    let raw: String = row.try_get(column).map_err(|e| e.to_string())?;
    raw.parse()
}

fn user_from_row(row: &PgRow) -> AuthResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role: parse_column(row, "role").map_err(AuthError::InvalidValue)?,
        balance: row.try_get("balance")?,
        status: parse_column(row, "status").map_err(AuthError::InvalidValue)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn match_from_row(row: &PgRow) -> MatchResult<Match> {
    Ok(Match {
        id: row.try_get("id")?,
        tournament_id: row.try_get("tournament_id")?,
        home_team_id: row.try_get("home_team_id")?,
        away_team_id: row.try_get("away_team_id")?,
        status: parse_column(row, "status").map_err(MatchError::Validation)?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        home_score: row.try_get("home_score")?,
        away_score: row.try_get("away_score")?,
        stadium: row.try_get("stadium")?,
        referee: row.try_get("referee")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn bet_from_row(row: &PgRow) -> LedgerResult<Bet> {
    Ok(Bet {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        match_id: row.try_get("match_id")?,
        bet_type: parse_column(row, "bet_type").map_err(LedgerError::Internal)?,
        amount: row.try_get("amount")?,
        odds: row.try_get("odds")?,
        status: parse_column(row, "status").map_err(LedgerError::Internal)?,
        result: row.try_get("result")?,
        payout: row.try_get("payout")?,
        promotion_id: row.try_get("promotion_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Default PostgreSQL implementation of `UserRepository`
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create_user(&self, user: NewUser) -> AuthResult<User> {
        let sql = format!(
            "INSERT INTO users (name, email, password_hash, role, balance)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        );
        let result = with_default_timeout(
            sqlx::query(&sql)
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(user.role.as_str())
                .bind(user.balance)
                .fetch_one(&self.pool),
        )
        .await;

        match result {
            Ok(row) => user_from_row(&row),
            Err(super::timeouts::TimeoutError::Database(e)) if is_unique_violation(&e) => {
                Err(AuthError::EmailTaken)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<UserCredentials>> {
        let sql = format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1");
        let row = with_default_timeout(sqlx::query(&sql).bind(email).fetch_optional(&self.pool))
            .await?;

        row.map(|r| -> AuthResult<UserCredentials> {
            Ok(UserCredentials {
                user: user_from_row(&r)?,
                password_hash: r.try_get("password_hash")?,
            })
        })
        .transpose()
    }

    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = with_default_timeout(sqlx::query(&sql).bind(user_id).fetch_optional(&self.pool))
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn update_status(
        &self,
        user_id: UserId,
        status: UserStatus,
    ) -> AuthResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET status = $1, updated_at = NOW()
             WHERE id = $2
             RETURNING {USER_COLUMNS}"
        );
        let row = with_default_timeout(
            sqlx::query(&sql)
                .bind(status.as_str())
                .bind(user_id)
                .fetch_optional(&self.pool),
        )
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }
}

/// Default PostgreSQL implementation of `MatchRepository`
pub struct PgMatchRepository {
    pool: PgPool,
}

impl PgMatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_match_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &MatchFilter) {
    qb.push(" WHERE TRUE");
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(tournament_id) = filter.tournament_id {
        qb.push(" AND tournament_id = ").push_bind(tournament_id);
    }
    if let Some(team_id) = filter.team_id {
        qb.push(" AND (home_team_id = ")
            .push_bind(team_id)
            .push(" OR away_team_id = ")
            .push_bind(team_id)
            .push(")");
    }
    if let Some(from) = filter.starts_from {
        qb.push(" AND start_time >= ").push_bind(from);
    }
    if let Some(until) = filter.ends_before {
        qb.push(" AND end_time < ").push_bind(until);
    }
}

#[async_trait]
impl MatchRepository for PgMatchRepository {
    async fn create_match(&self, new_match: NewMatch) -> MatchResult<Match> {
        let sql = format!(
            "INSERT INTO matches
                (tournament_id, home_team_id, away_team_id, start_time, end_time, stadium, referee)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {MATCH_COLUMNS}"
        );
        let row = with_default_timeout(
            sqlx::query(&sql)
                .bind(new_match.tournament_id)
                .bind(new_match.home_team_id)
                .bind(new_match.away_team_id)
                .bind(new_match.start_time)
                .bind(new_match.end_time)
                .bind(&new_match.stadium)
                .bind(&new_match.referee)
                .fetch_one(&self.pool),
        )
        .await?;

        match_from_row(&row)
    }

    async fn find_match(&self, match_id: MatchId) -> MatchResult<Option<Match>> {
        let sql = format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1");
        let row = with_default_timeout(sqlx::query(&sql).bind(match_id).fetch_optional(&self.pool))
            .await?;

        row.as_ref().map(match_from_row).transpose()
    }

    async fn find_overlapping(
        &self,
        team_ids: [i64; 2],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<MatchId>,
    ) -> MatchResult<Option<Match>> {
        let sql = format!(
            "SELECT {MATCH_COLUMNS} FROM matches
             WHERE (home_team_id = ANY($1) OR away_team_id = ANY($1))
               AND start_time <= $3 AND end_time >= $2
               AND status <> 'cancelled'
               AND ($4::BIGINT IS NULL OR id <> $4)
             ORDER BY start_time
             LIMIT 1"
        );
        let row = with_default_timeout(
            sqlx::query(&sql)
                .bind(team_ids.to_vec())
                .bind(start)
                .bind(end)
                .bind(exclude)
                .fetch_optional(&self.pool),
        )
        .await?;

        row.as_ref().map(match_from_row).transpose()
    }

    async fn list_matches(
        &self,
        filter: &MatchFilter,
        pagination: Pagination,
    ) -> MatchResult<Page<Match>> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM matches");
        push_match_filters(&mut count_qb, filter);
        let total: i64 =
            with_default_timeout(count_qb.build_query_scalar::<i64>().fetch_one(&self.pool)).await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {MATCH_COLUMNS} FROM matches"));
        push_match_filters(&mut qb, filter);
        qb.push(" ORDER BY start_time DESC, id DESC LIMIT ")
            .push_bind(i64::from(pagination.limit))
            .push(" OFFSET ")
            .push_bind(pagination.offset());
        let rows = with_default_timeout(qb.build().fetch_all(&self.pool)).await?;

        Ok(Page {
            items: rows.iter().map(match_from_row).collect::<MatchResult<_>>()?,
            total,
            pagination,
        })
    }

    async fn save_match(&self, m: &Match) -> MatchResult<Match> {
        let sql = format!(
            "UPDATE matches
             SET status = $1, start_time = $2, end_time = $3, home_score = $4,
                 away_score = $5, stadium = $6, referee = $7, updated_at = NOW()
             WHERE id = $8
             RETURNING {MATCH_COLUMNS}"
        );
        let row = with_default_timeout(
            sqlx::query(&sql)
                .bind(m.status.as_str())
                .bind(m.start_time)
                .bind(m.end_time)
                .bind(m.home_score)
                .bind(m.away_score)
                .bind(&m.stadium)
                .bind(&m.referee)
                .bind(m.id)
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(MatchError::NotFound(m.id))?;

        match_from_row(&row)
    }
}

/// Default PostgreSQL implementation of `BetRepository`
pub struct PgBetRepository {
    pool: PgPool,
}

impl PgBetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_bet_filters(qb: &mut QueryBuilder<'_, Postgres>, user_id: UserId, filter: &BetFilter) {
    qb.push(" WHERE user_id = ").push_bind(user_id);
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(match_id) = filter.match_id {
        qb.push(" AND match_id = ").push_bind(match_id);
    }
    if let Some(bet_type) = filter.bet_type {
        qb.push(" AND bet_type = ").push_bind(bet_type.as_str());
    }
    if let Some(from) = filter.created_from() {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(until) = filter.created_before() {
        qb.push(" AND created_at < ").push_bind(until);
    }
}

#[async_trait]
impl BetRepository for PgBetRepository {
    async fn find_account(&self, user_id: UserId) -> LedgerResult<Option<Account>> {
        let row = with_default_timeout(
            sqlx::query("SELECT id, balance FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool),
        )
        .await?;

        row.map(|r| -> LedgerResult<Account> {
            Ok(Account {
                user_id: r.try_get("id")?,
                balance: r.try_get("balance")?,
            })
        })
        .transpose()
    }

    async fn find_bet(&self, bet_id: BetId) -> LedgerResult<Option<Bet>> {
        let sql = format!("SELECT {BET_COLUMNS} FROM bets WHERE id = $1");
        let row = with_default_timeout(sqlx::query(&sql).bind(bet_id).fetch_optional(&self.pool))
            .await?;

        row.as_ref().map(bet_from_row).transpose()
    }

    async fn find_user_bet(&self, user_id: UserId, bet_id: BetId) -> LedgerResult<Option<Bet>> {
        let sql = format!("SELECT {BET_COLUMNS} FROM bets WHERE id = $1 AND user_id = $2");
        let row = with_default_timeout(
            sqlx::query(&sql)
                .bind(bet_id)
                .bind(user_id)
                .fetch_optional(&self.pool),
        )
        .await?;

        row.as_ref().map(bet_from_row).transpose()
    }

    async fn has_pending_bet(&self, user_id: UserId, match_id: MatchId) -> LedgerResult<bool> {
        let exists: bool = with_default_timeout(
            sqlx::query_scalar(
                "SELECT EXISTS (
                    SELECT 1 FROM bets
                    WHERE user_id = $1 AND match_id = $2 AND status = 'pending'
                 )",
            )
            .bind(user_id)
            .bind(match_id)
            .fetch_one(&self.pool),
        )
        .await?;

        Ok(exists)
    }

    async fn list_bets(
        &self,
        user_id: UserId,
        filter: &BetFilter,
        pagination: Pagination,
    ) -> LedgerResult<Page<Bet>> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM bets");
        push_bet_filters(&mut count_qb, user_id, filter);
        let total: i64 =
            with_default_timeout(count_qb.build_query_scalar::<i64>().fetch_one(&self.pool)).await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {BET_COLUMNS} FROM bets"));
        push_bet_filters(&mut qb, user_id, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(pagination.limit))
            .push(" OFFSET ")
            .push_bind(pagination.offset());
        let rows = with_default_timeout(qb.build().fetch_all(&self.pool)).await?;

        Ok(Page {
            items: rows.iter().map(bet_from_row).collect::<LedgerResult<_>>()?,
            total,
            pagination,
        })
    }

    async fn place_bet(&self, bet: NewBet, now: DateTime<Utc>) -> LedgerResult<Bet> {
        with_transaction_timeout::<_, _, LedgerError>(async {
            let mut tx = self.pool.begin().await?;

            // Conditional debit; the UPDATE also row-locks the user until commit,
            // so concurrent placements by the same user run one after another.
            let debited = sqlx::query(
                "UPDATE users
                 SET balance = balance - $1, updated_at = NOW()
                 WHERE id = $2 AND balance >= $1
                 RETURNING balance",
            )
            .bind(bet.amount)
            .bind(bet.user_id)
            .fetch_optional(&mut *tx)
            .await?;

            if debited.is_none() {
                let current = sqlx::query("SELECT balance FROM users WHERE id = $1")
                    .bind(bet.user_id)
                    .fetch_optional(&mut *tx)
                    .await?;

                return Err(match current {
                    Some(row) => LedgerError::InsufficientFunds {
                        available: row.try_get::<Decimal, _>("balance")?,
                        required: bet.amount,
                    },
                    None => LedgerError::NotFound("User"),
                });
            }

            let match_sql = format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1 FOR SHARE");
            let match_row = sqlx::query(&match_sql)
                .bind(bet.match_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(LedgerError::NotFound("Match"))?;
            match_from_row(&match_row)?
                .ensure_open_for_betting(now)
                .map_err(|closed| LedgerError::InvalidState(closed.to_string()))?;

            let duplicate: bool = sqlx::query_scalar(
                "SELECT EXISTS (
                    SELECT 1 FROM bets
                    WHERE user_id = $1 AND match_id = $2 AND status = 'pending'
                 )",
            )
            .bind(bet.user_id)
            .bind(bet.match_id)
            .fetch_one(&mut *tx)
            .await?;
            if duplicate {
                return Err(LedgerError::Conflict(messages::DUPLICATE_PENDING.to_string()));
            }

            let insert_sql = format!(
                "INSERT INTO bets
                    (user_id, match_id, bet_type, amount, odds, status, promotion_id, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $7)
                 RETURNING {BET_COLUMNS}"
            );
            let inserted = sqlx::query(&insert_sql)
                .bind(bet.user_id)
                .bind(bet.match_id)
                .bind(bet.bet_type.as_str())
                .bind(bet.amount)
                .bind(bet.odds)
                .bind(bet.promotion_id)
                .bind(now)
                .fetch_one(&mut *tx)
                .await;

            // The partial unique index is the last line against a racing insert
            let row = match inserted {
                Ok(row) => row,
                Err(e) if is_unique_violation(&e) => {
                    return Err(LedgerError::Conflict(messages::DUPLICATE_PENDING.to_string()));
                }
                Err(e) => return Err(e.into()),
            };
            let placed = bet_from_row(&row)?;

            tx.commit().await?;

            Ok(placed)
        })
        .await
    }

    async fn cancel_bet(
        &self,
        user_id: UserId,
        bet_id: BetId,
        now: DateTime<Utc>,
    ) -> LedgerResult<CancelledBet> {
        with_transaction_timeout::<_, _, LedgerError>(async {
            let mut tx = self.pool.begin().await?;

            // Conditional transition; a second cancel finds no pending row
            let cancel_sql = format!(
                "UPDATE bets
                 SET status = 'cancelled', updated_at = $3
                 WHERE id = $1 AND user_id = $2 AND status = 'pending'
                 RETURNING {BET_COLUMNS}"
            );
            let cancelled = sqlx::query(&cancel_sql)
                .bind(bet_id)
                .bind(user_id)
                .bind(now)
                .fetch_optional(&mut *tx)
                .await?;

            let Some(row) = cancelled else {
                let existing = sqlx::query("SELECT user_id FROM bets WHERE id = $1")
                    .bind(bet_id)
                    .fetch_optional(&mut *tx)
                    .await?;

                return Err(match existing {
                    None => LedgerError::NotFound("Bet"),
                    Some(r) if r.try_get::<i64, _>("user_id")? != user_id => {
                        LedgerError::Forbidden(messages::NOT_OWNER.to_string())
                    }
                    Some(_) => LedgerError::InvalidState(messages::ONLY_PENDING.to_string()),
                });
            };
            let bet = bet_from_row(&row)?;

            let match_sql = format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1 FOR SHARE");
            let match_row = sqlx::query(&match_sql)
                .bind(bet.match_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(LedgerError::NotFound("Match"))?;
            match_from_row(&match_row)?
                .ensure_open_for_betting(now)
                .map_err(|_| LedgerError::InvalidState(messages::MATCH_STARTED.to_string()))?;

            let balance_after: Decimal = sqlx::query_scalar(
                "UPDATE users
                 SET balance = balance + $1, updated_at = NOW()
                 WHERE id = $2
                 RETURNING balance",
            )
            .bind(bet.amount)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LedgerError::NotFound("User"))?;

            tx.commit().await?;

            Ok(CancelledBet { bet, balance_after })
        })
        .await
    }
}
