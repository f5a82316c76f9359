//! Match read model error types.

use thiserror::Error;

use crate::db::timeouts::TimeoutError;

/// Match errors
#[derive(Debug, Error)]
pub enum MatchError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database call exceeded its deadline
    #[error("Database timeout: {0}")]
    Timeout(String),

    /// Malformed or out-of-range input
    #[error("Invalid match data: {0}")]
    Validation(String),

    /// Match not found
    #[error("Match not found: {0}")]
    NotFound(i64),

    /// A team already has a match in the requested window
    #[error("Team {team_id} already has match {match_id} scheduled in that window")]
    ScheduleConflict { team_id: i64, match_id: i64 },

    /// Operation not legal in the match's current status
    #[error("Invalid match state: {0}")]
    InvalidState(String),
}

impl From<TimeoutError> for MatchError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Database(e) => MatchError::Database(e),
            TimeoutError::Timeout(d) => MatchError::Timeout(format!("{d:?}")),
        }
    }
}

impl MatchError {
    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            MatchError::Database(_) | MatchError::Timeout(_) => {
                "Internal server error".to_string()
            }
            MatchError::NotFound(_) => "Match not found".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for match operations
pub type MatchResult<T> = Result<T, MatchError>;
