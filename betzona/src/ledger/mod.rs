//! Bet ledger: placement and cancellation with atomic balance updates.
//!
//! A bet reserves its stake when placed and returns it when cancelled. Both
//! operations change two records (the user's balance and the bet) and are
//! delegated to a [`crate::db::BetRepository`] that applies the pair as one
//! unit of work.
//!
//! ## Example
//!
//! ```no_run
//! use betzona::db::MemoryStore;
//! use betzona::ledger::{BetManager, PlaceBetRequest};
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let ledger = BetManager::new(store.clone(), store);
//!
//! let bet = ledger
//!     .place_bet(
//!         1,
//!         PlaceBetRequest {
//!             match_id: 7,
//!             bet_type: "win".to_string(),
//!             amount: Decimal::new(2500, 2),
//!             odds: Decimal::new(180, 2),
//!             promotion_id: None,
//!         },
//!     )
//!     .await?;
//! ledger.cancel_bet(1, bet.id).await?;
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{LedgerError, LedgerResult, messages};
pub use manager::{BetManager, MAX_ODDS, ODDS_SCALE, STAKE_SCALE};
pub use models::{
    Account, Bet, BetFilter, BetId, BetStatus, BetType, CancelledBet, NewBet, PlaceBetRequest,
};
