//! In-process store implementing every repository trait.
//!
//! All state lives behind one mutex and each trait call holds it for its
//! whole duration, so the two-write ledger operations are serializable: a
//! concurrent reader sees either none or all of a placement/cancellation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use super::repository::{BetRepository, MatchRepository, UserRepository};
use crate::{
    Page, Pagination,
    auth::{AuthError, AuthResult, NewUser, User, UserCredentials, UserId, UserStatus},
    fixtures::{Match, MatchError, MatchFilter, MatchId, MatchResult, MatchStatus, NewMatch},
    ledger::{
        Account, Bet, BetFilter, BetId, BetStatus, CancelledBet, LedgerError, LedgerResult, NewBet,
        messages,
    },
};

#[derive(Default)]
struct State {
    users: BTreeMap<UserId, UserCredentials>,
    matches: BTreeMap<MatchId, Match>,
    bets: BTreeMap<BetId, Bet>,
    next_user_id: UserId,
    next_match_id: MatchId,
    next_bet_id: BetId,
}

impl State {
    fn has_pending_bet(&self, user_id: UserId, match_id: MatchId) -> bool {
        self.bets.values().any(|b| {
            b.user_id == user_id && b.match_id == match_id && b.status == BetStatus::Pending
        })
    }
}

/// Thread-safe in-memory persistence
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn page_of<T: Clone>(items: Vec<&T>, pagination: Pagination) -> Page<T> {
    let total = items.len() as i64;
    let items = items
        .into_iter()
        .skip(pagination.offset() as usize)
        .take(pagination.limit as usize)
        .cloned()
        .collect();
    Page {
        items,
        total,
        pagination,
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: NewUser) -> AuthResult<User> {
        let mut state = self.lock();
        if state.users.values().any(|c| c.user.email == user.email) {
            return Err(AuthError::EmailTaken);
        }

        state.next_user_id += 1;
        let now = Utc::now();
        let created = User {
            id: state.next_user_id,
            name: user.name,
            email: user.email,
            role: user.role,
            balance: user.balance,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(
            created.id,
            UserCredentials {
                user: created.clone(),
                password_hash: user.password_hash,
            },
        );
        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<UserCredentials>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|c| c.user.email == email)
            .cloned())
    }

    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        Ok(self.lock().users.get(&user_id).map(|c| c.user.clone()))
    }

    async fn update_status(
        &self,
        user_id: UserId,
        status: UserStatus,
    ) -> AuthResult<Option<User>> {
        let mut state = self.lock();
        Ok(state.users.get_mut(&user_id).map(|c| {
            c.user.status = status;
            c.user.updated_at = Utc::now();
            c.user.clone()
        }))
    }
}

#[async_trait]
impl MatchRepository for MemoryStore {
    async fn create_match(&self, new_match: NewMatch) -> MatchResult<Match> {
        let mut state = self.lock();
        state.next_match_id += 1;
        let now = Utc::now();
        let created = Match {
            id: state.next_match_id,
            tournament_id: new_match.tournament_id,
            home_team_id: new_match.home_team_id,
            away_team_id: new_match.away_team_id,
            status: MatchStatus::Scheduled,
            start_time: new_match.start_time,
            end_time: new_match.end_time,
            home_score: 0,
            away_score: 0,
            stadium: new_match.stadium,
            referee: new_match.referee,
            created_at: now,
            updated_at: now,
        };
        state.matches.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_match(&self, match_id: MatchId) -> MatchResult<Option<Match>> {
        Ok(self.lock().matches.get(&match_id).cloned())
    }

    async fn find_overlapping(
        &self,
        team_ids: [i64; 2],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<MatchId>,
    ) -> MatchResult<Option<Match>> {
        let state = self.lock();
        let mut clashes: Vec<&Match> = state
            .matches
            .values()
            .filter(|m| Some(m.id) != exclude && m.status != MatchStatus::Cancelled)
            .filter(|m| team_ids.iter().any(|t| m.involves_team(*t)))
            .filter(|m| m.overlaps(start, end))
            .collect();
        clashes.sort_by_key(|m| m.start_time);
        Ok(clashes.first().map(|m| (*m).clone()))
    }

    async fn list_matches(
        &self,
        filter: &MatchFilter,
        pagination: Pagination,
    ) -> MatchResult<Page<Match>> {
        let state = self.lock();
        let mut matching: Vec<&Match> =
            state.matches.values().filter(|m| filter.matches(m)).collect();
        matching.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        Ok(page_of(matching, pagination))
    }

    async fn save_match(&self, m: &Match) -> MatchResult<Match> {
        let mut state = self.lock();
        let stored = state
            .matches
            .get_mut(&m.id)
            .ok_or(MatchError::NotFound(m.id))?;
        *stored = Match {
            updated_at: Utc::now(),
            ..m.clone()
        };
        Ok(stored.clone())
    }
}

#[async_trait]
impl BetRepository for MemoryStore {
    async fn find_account(&self, user_id: UserId) -> LedgerResult<Option<Account>> {
        Ok(self.lock().users.get(&user_id).map(|c| Account {
            user_id,
            balance: c.user.balance,
        }))
    }

    async fn find_bet(&self, bet_id: BetId) -> LedgerResult<Option<Bet>> {
        Ok(self.lock().bets.get(&bet_id).cloned())
    }

    async fn find_user_bet(&self, user_id: UserId, bet_id: BetId) -> LedgerResult<Option<Bet>> {
        Ok(self
            .lock()
            .bets
            .get(&bet_id)
            .filter(|b| b.user_id == user_id)
            .cloned())
    }

    async fn has_pending_bet(&self, user_id: UserId, match_id: MatchId) -> LedgerResult<bool> {
        Ok(self.lock().has_pending_bet(user_id, match_id))
    }

    async fn list_bets(
        &self,
        user_id: UserId,
        filter: &BetFilter,
        pagination: Pagination,
    ) -> LedgerResult<Page<Bet>> {
        let state = self.lock();
        let mut matching: Vec<&Bet> = state
            .bets
            .values()
            .filter(|b| b.user_id == user_id && filter.matches(b))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page_of(matching, pagination))
    }

    async fn place_bet(&self, bet: NewBet, now: DateTime<Utc>) -> LedgerResult<Bet> {
        let mut state = self.lock();

        let available = state
            .users
            .get(&bet.user_id)
            .map(|c| c.user.balance)
            .ok_or(LedgerError::NotFound("User"))?;
        if available < bet.amount {
            return Err(LedgerError::InsufficientFunds {
                available,
                required: bet.amount,
            });
        }

        state
            .matches
            .get(&bet.match_id)
            .ok_or(LedgerError::NotFound("Match"))?
            .ensure_open_for_betting(now)
            .map_err(|closed| LedgerError::InvalidState(closed.to_string()))?;

        if state.has_pending_bet(bet.user_id, bet.match_id) {
            return Err(LedgerError::Conflict(messages::DUPLICATE_PENDING.to_string()));
        }

        // Every check passed; the two writes below cannot fail.
        if let Some(account) = state.users.get_mut(&bet.user_id) {
            account.user.balance -= bet.amount;
            account.user.updated_at = now;
        }

        state.next_bet_id += 1;
        let placed = Bet {
            id: state.next_bet_id,
            user_id: bet.user_id,
            match_id: bet.match_id,
            bet_type: bet.bet_type,
            amount: bet.amount,
            odds: bet.odds,
            status: BetStatus::Pending,
            result: None,
            payout: None,
            promotion_id: bet.promotion_id,
            created_at: now,
            updated_at: now,
        };
        state.bets.insert(placed.id, placed.clone());
        Ok(placed)
    }

    async fn cancel_bet(
        &self,
        user_id: UserId,
        bet_id: BetId,
        now: DateTime<Utc>,
    ) -> LedgerResult<CancelledBet> {
        let mut state = self.lock();

        let bet = state.bets.get(&bet_id).ok_or(LedgerError::NotFound("Bet"))?;
        if bet.user_id != user_id {
            return Err(LedgerError::Forbidden(messages::NOT_OWNER.to_string()));
        }
        if bet.status != BetStatus::Pending {
            return Err(LedgerError::InvalidState(messages::ONLY_PENDING.to_string()));
        }
        let (match_id, amount) = (bet.match_id, bet.amount);

        state
            .matches
            .get(&match_id)
            .ok_or(LedgerError::NotFound("Match"))?
            .ensure_open_for_betting(now)
            .map_err(|_| LedgerError::InvalidState(messages::MATCH_STARTED.to_string()))?;

        let account = state
            .users
            .get_mut(&user_id)
            .ok_or(LedgerError::NotFound("User"))?;
        account.user.balance += amount;
        account.user.updated_at = now;
        let balance_after = account.user.balance;

        let bet = state
            .bets
            .get_mut(&bet_id)
            .ok_or(LedgerError::NotFound("Bet"))?;
        bet.status = BetStatus::Cancelled;
        bet.updated_at = now;

        Ok(CancelledBet {
            bet: bet.clone(),
            balance_after,
        })
    }
}
