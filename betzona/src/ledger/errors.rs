//! Bet ledger error types.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{db::timeouts::TimeoutError, fixtures::MatchError};

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database call exceeded its deadline
    #[error("Database timeout: {0}")]
    Timeout(String),

    /// Malformed or out-of-range input
    #[error("Invalid bet: {0}")]
    Validation(String),

    /// Referenced entity absent
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Authenticated but not the owner
    #[error("{0}")]
    Forbidden(String),

    /// A pending bet on the same match already exists
    #[error("{0}")]
    Conflict(String),

    /// Balance too low for the stake
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: Decimal, required: Decimal },

    /// Operation not legal given current entity state
    #[error("{0}")]
    InvalidState(String),

    /// Store-level failure that is not a database error
    #[error("Internal ledger error: {0}")]
    Internal(String),
}

impl From<TimeoutError> for LedgerError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Database(e) => LedgerError::Database(e),
            TimeoutError::Timeout(d) => LedgerError::Timeout(format!("{d:?}")),
        }
    }
}

impl From<MatchError> for LedgerError {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::Database(e) => LedgerError::Database(e),
            MatchError::Timeout(t) => LedgerError::Timeout(t),
            MatchError::NotFound(_) => LedgerError::NotFound("Match"),
            MatchError::InvalidState(msg) => LedgerError::InvalidState(msg),
            MatchError::Validation(msg) => LedgerError::Validation(msg),
            other => LedgerError::Internal(other.to_string()),
        }
    }
}

impl LedgerError {
    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Database failures are reduced to a generic message; callers attach a
    /// correlation id instead.
    pub fn client_message(&self) -> String {
        match self {
            LedgerError::Database(_) | LedgerError::Timeout(_) | LedgerError::Internal(_) => {
                "Internal server error".to_string()
            }
            LedgerError::InsufficientFunds { .. } => {
                "Insufficient funds to place this bet".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Whether the failure is transient and the same request may succeed later
    ///
    /// Deadlines, pool exhaustion and dropped connections qualify; constraint
    /// violations and other database errors do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Timeout(_) => true,
            LedgerError::Database(e) => {
                matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
            }
            _ => false,
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Human-readable messages shared by every `BetRepository` implementation
pub mod messages {
    pub const DUPLICATE_PENDING: &str = "a pending bet on this match already exists";
    pub const NOT_OWNER: &str = "bet belongs to another user";
    pub const ONLY_PENDING: &str = "only pending bets can be cancelled";
    pub const MATCH_STARTED: &str = "match already started";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transient_failures_are_retryable() {
        assert!(LedgerError::from(TimeoutError::Timeout(Duration::from_secs(5))).is_retryable());
        assert!(LedgerError::Database(sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn test_permanent_failures_are_not_retryable() {
        assert!(!LedgerError::Database(sqlx::Error::RowNotFound).is_retryable());
        assert!(!LedgerError::Internal("lock poisoned".into()).is_retryable());
        assert!(!LedgerError::Conflict(messages::DUPLICATE_PENDING.into()).is_retryable());
    }

    #[test]
    fn test_client_message_hides_database_detail() {
        let err = LedgerError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(err.client_message(), "Internal server error");
    }
}
