//! Bet ledger manager.

use super::{
    errors::{LedgerError, LedgerResult, messages},
    models::{Bet, BetFilter, BetId, BetStatus, BetType, CancelledBet, NewBet, PlaceBetRequest},
};
use crate::{
    Page, Pagination,
    auth::UserId,
    db::{BetRepository, MatchRepository},
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Largest number of decimal places accepted for a stake
pub const STAKE_SCALE: u32 = 2;

/// Largest number of decimal places accepted for odds
pub const ODDS_SCALE: u32 = 4;

/// Exclusive upper bound on odds, matching the `NUMERIC(10, 4)` column
pub const MAX_ODDS: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Bet ledger manager
///
/// Runs the fail-fast checks against current state, then hands the write to
/// the repository, which repeats the state-dependent checks inside its own
/// unit of work. The early checks give precise errors; the repository
/// re-checks keep concurrent requests from slipping past them.
#[derive(Clone)]
pub struct BetManager {
    bets: Arc<dyn BetRepository>,
    matches: Arc<dyn MatchRepository>,
}

impl BetManager {
    /// Create a new bet manager
    ///
    /// # Arguments
    ///
    /// * `bets` - Ledger repository (accounts and bets)
    /// * `matches` - Match repository used for eligibility checks
    pub fn new(bets: Arc<dyn BetRepository>, matches: Arc<dyn MatchRepository>) -> Self {
        Self { bets, matches }
    }

    /// Place a bet, reserving the stake from the user's balance
    ///
    /// # Errors
    ///
    /// Checked in this order, first failure wins:
    ///
    /// * `LedgerError::Validation` - Bad amount or odds range/precision, unknown bet type
    /// * `LedgerError::NotFound` - User does not exist
    /// * `LedgerError::InsufficientFunds` - Balance below the stake
    /// * `LedgerError::NotFound` - Match does not exist
    /// * `LedgerError::InvalidState` - Match not scheduled or already started
    /// * `LedgerError::Conflict` - A pending bet on this match already exists
    pub async fn place_bet(&self, user_id: UserId, request: PlaceBetRequest) -> LedgerResult<Bet> {
        let bet_type = validate_request(&request)?;

        let account = self
            .bets
            .find_account(user_id)
            .await?
            .ok_or(LedgerError::NotFound("User"))?;
        if account.balance < request.amount {
            return Err(LedgerError::InsufficientFunds {
                available: account.balance,
                required: request.amount,
            });
        }

        let now = Utc::now();
        self.matches
            .find_match(request.match_id)
            .await?
            .ok_or(LedgerError::NotFound("Match"))?
            .ensure_open_for_betting(now)
            .map_err(|closed| LedgerError::InvalidState(closed.to_string()))?;

        if self.bets.has_pending_bet(user_id, request.match_id).await? {
            return Err(LedgerError::Conflict(messages::DUPLICATE_PENDING.to_string()));
        }

        let bet = self
            .bets
            .place_bet(
                NewBet {
                    user_id,
                    match_id: request.match_id,
                    bet_type,
                    amount: request.amount,
                    odds: request.odds,
                    promotion_id: request.promotion_id,
                },
                now,
            )
            .await?;

        log::info!(
            "Bet {} placed: user {} match {} {} stake {} @ {}",
            bet.id,
            bet.user_id,
            bet.match_id,
            bet.bet_type,
            bet.amount,
            bet.odds
        );
        Ok(bet)
    }

    /// Cancel a pending bet and return the stake
    ///
    /// # Errors
    ///
    /// * `LedgerError::NotFound` - Bet does not exist
    /// * `LedgerError::Forbidden` - Bet belongs to another user
    /// * `LedgerError::InvalidState` - Bet not pending, or its match already started
    pub async fn cancel_bet(&self, user_id: UserId, bet_id: BetId) -> LedgerResult<CancelledBet> {
        let bet = self
            .bets
            .find_bet(bet_id)
            .await?
            .ok_or(LedgerError::NotFound("Bet"))?;

        if bet.user_id != user_id {
            log::warn!("User {user_id} tried to cancel bet {bet_id} owned by {}", bet.user_id);
            return Err(LedgerError::Forbidden(messages::NOT_OWNER.to_string()));
        }
        if bet.status != BetStatus::Pending {
            return Err(LedgerError::InvalidState(messages::ONLY_PENDING.to_string()));
        }

        let now = Utc::now();
        self.matches
            .find_match(bet.match_id)
            .await?
            .ok_or(LedgerError::NotFound("Match"))?
            .ensure_open_for_betting(now)
            .map_err(|_| LedgerError::InvalidState(messages::MATCH_STARTED.to_string()))?;

        let cancelled = self.bets.cancel_bet(user_id, bet_id, now).await?;

        log::info!(
            "Bet {} cancelled: user {} refunded {} (balance {})",
            cancelled.bet.id,
            user_id,
            cancelled.bet.amount,
            cancelled.balance_after
        );
        Ok(cancelled)
    }

    /// Page through a user's bets, newest first
    pub async fn list_bets(
        &self,
        user_id: UserId,
        filter: &BetFilter,
        pagination: Pagination,
    ) -> LedgerResult<Page<Bet>> {
        self.bets.list_bets(user_id, filter, pagination).await
    }

    /// Fetch one of the user's bets. Bets of other users are reported as missing.
    pub async fn get_bet(&self, user_id: UserId, bet_id: BetId) -> LedgerResult<Bet> {
        self.bets
            .find_user_bet(user_id, bet_id)
            .await?
            .ok_or(LedgerError::NotFound("Bet"))
    }
}

/// Input-shape checks, independent of stored state
fn validate_request(request: &PlaceBetRequest) -> LedgerResult<BetType> {
    if request.amount <= Decimal::ZERO {
        return Err(LedgerError::Validation(
            "amount must be greater than 0".to_string(),
        ));
    }
    if request.amount.normalize().scale() > STAKE_SCALE {
        return Err(LedgerError::Validation(format!(
            "amount cannot have more than {STAKE_SCALE} decimal places"
        )));
    }
    if request.odds <= Decimal::ONE {
        return Err(LedgerError::Validation(
            "odds must be greater than 1.0".to_string(),
        ));
    }
    if request.odds.normalize().scale() > ODDS_SCALE {
        return Err(LedgerError::Validation(format!(
            "odds cannot have more than {ODDS_SCALE} decimal places"
        )));
    }
    if request.odds >= MAX_ODDS {
        return Err(LedgerError::Validation(format!(
            "odds must be less than {MAX_ODDS}"
        )));
    }

    request
        .bet_type
        .parse::<BetType>()
        .map_err(LedgerError::Validation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(amount: Decimal, odds: Decimal, bet_type: &str) -> PlaceBetRequest {
        PlaceBetRequest {
            match_id: 1,
            bet_type: bet_type.to_string(),
            amount,
            odds,
            promotion_id: None,
        }
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        let t = validate_request(&request(dec!(10.50), dec!(1.01), "exact_score")).unwrap();
        assert_eq!(t, BetType::ExactScore);
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_request(&request(dec!(0), dec!(2), "win")).is_err());
        assert!(validate_request(&request(dec!(-1), dec!(2), "win")).is_err());
        assert!(validate_request(&request(dec!(1.001), dec!(2), "win")).is_err());
        // Trailing zeros do not count as precision
        assert!(validate_request(&request(dec!(1.500), dec!(2), "win")).is_ok());
    }

    #[test]
    fn test_validate_odds() {
        assert!(validate_request(&request(dec!(5), dec!(1.0), "win")).is_err());
        assert!(validate_request(&request(dec!(5), dec!(0.5), "win")).is_err());
    }

    #[test]
    fn test_validate_odds_precision() {
        let err = validate_request(&request(dec!(5), dec!(1.00001), "win")).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(validate_request(&request(dec!(5), dec!(2.123456), "win")).is_err());
        assert!(validate_request(&request(dec!(5), dec!(2.1235), "win")).is_ok());
        // Trailing zeros do not count as precision
        assert!(validate_request(&request(dec!(5), dec!(1.850000), "win")).is_ok());
    }

    #[test]
    fn test_validate_odds_upper_bound() {
        let err = validate_request(&request(dec!(5), dec!(10000000), "win")).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(validate_request(&request(dec!(5), dec!(1000000), "win")).is_err());
        assert!(validate_request(&request(dec!(5), dec!(999999.9999), "win")).is_ok());
    }

    #[test]
    fn test_validate_bet_type() {
        let err = validate_request(&request(dec!(5), dec!(2), "moneyline")).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }
}
