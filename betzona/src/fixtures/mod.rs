//! Match read model.
//!
//! The ledger only needs three facts about a match: that it exists, its
//! status, and its start time. This module owns those facts and the admin
//! operations that change them (scheduling, partial updates, soft cancel).
//! Teams and tournaments are referenced by id only.

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{MatchError, MatchResult};
pub use manager::MatchManager;
pub use models::{
    BettingClosed, Match, MatchFilter, MatchId, MatchStatus, MatchUpdate, NewMatch,
};
