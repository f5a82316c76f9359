//! Match manager: the read side the ledger relies on plus admin edits.

use super::{
    errors::{MatchError, MatchResult},
    models::{Match, MatchFilter, MatchId, MatchStatus, MatchUpdate, NewMatch},
};
use crate::{Page, Pagination, db::MatchRepository};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Match manager
#[derive(Clone)]
pub struct MatchManager {
    matches: Arc<dyn MatchRepository>,
}

impl MatchManager {
    pub fn new(matches: Arc<dyn MatchRepository>) -> Self {
        Self { matches }
    }

    /// Schedule a new match
    ///
    /// # Errors
    ///
    /// * `MatchError::Validation` - Same team twice or an empty time window
    /// * `MatchError::ScheduleConflict` - Either team already plays in that window
    pub async fn create_match(&self, new_match: NewMatch) -> MatchResult<Match> {
        if new_match.home_team_id == new_match.away_team_id {
            return Err(MatchError::Validation(
                "home and away team must differ".to_string(),
            ));
        }
        validate_window(new_match.start_time, new_match.end_time)?;

        self.ensure_no_overlap(
            [new_match.home_team_id, new_match.away_team_id],
            new_match.start_time,
            new_match.end_time,
            None,
        )
        .await?;

        let created = self.matches.create_match(new_match).await?;
        log::info!(
            "Scheduled match {} ({} vs {}) at {}",
            created.id,
            created.home_team_id,
            created.away_team_id,
            created.start_time
        );
        Ok(created)
    }

    pub async fn get_match(&self, match_id: MatchId) -> MatchResult<Match> {
        self.matches
            .find_match(match_id)
            .await?
            .ok_or(MatchError::NotFound(match_id))
    }

    pub async fn list_matches(
        &self,
        filter: &MatchFilter,
        pagination: Pagination,
    ) -> MatchResult<Page<Match>> {
        self.matches.list_matches(filter, pagination).await
    }

    /// Apply a partial update. Finished and cancelled matches are frozen.
    pub async fn update_match(&self, match_id: MatchId, update: MatchUpdate) -> MatchResult<Match> {
        let current = self.get_match(match_id).await?;
        if current.status.is_terminal() {
            return Err(MatchError::InvalidState(format!(
                "match is {} and can no longer change",
                current.status
            )));
        }

        let window_changed = update.start_time.is_some() || update.end_time.is_some();
        let mut next = current;
        if let Some(status) = update.status {
            next.status = status;
        }
        if let Some(start) = update.start_time {
            next.start_time = start;
        }
        if let Some(end) = update.end_time {
            next.end_time = end;
        }
        if let Some(score) = update.home_score {
            next.home_score = score;
        }
        if let Some(score) = update.away_score {
            next.away_score = score;
        }
        if update.stadium.is_some() {
            next.stadium = update.stadium;
        }
        if update.referee.is_some() {
            next.referee = update.referee;
        }

        if next.home_score < 0 || next.away_score < 0 {
            return Err(MatchError::Validation("scores cannot be negative".to_string()));
        }
        validate_window(next.start_time, next.end_time)?;

        if window_changed && next.status != MatchStatus::Cancelled {
            self.ensure_no_overlap(
                [next.home_team_id, next.away_team_id],
                next.start_time,
                next.end_time,
                Some(next.id),
            )
            .await?;
        }

        let saved = self.matches.save_match(&next).await?;
        log::info!("Updated match {} (status {})", saved.id, saved.status);
        Ok(saved)
    }

    /// Soft delete: the match stays stored with status `cancelled`
    pub async fn cancel_match(&self, match_id: MatchId) -> MatchResult<Match> {
        let mut current = self.get_match(match_id).await?;
        match current.status {
            MatchStatus::Live | MatchStatus::Finished => {
                return Err(MatchError::InvalidState(format!(
                    "cannot cancel a {} match",
                    current.status
                )));
            }
            MatchStatus::Cancelled => {
                return Err(MatchError::InvalidState(
                    "match already cancelled".to_string(),
                ));
            }
            MatchStatus::Scheduled | MatchStatus::Postponed => {}
        }

        current.status = MatchStatus::Cancelled;
        let saved = self.matches.save_match(&current).await?;
        log::info!("Cancelled match {}", saved.id);
        Ok(saved)
    }

    async fn ensure_no_overlap(
        &self,
        team_ids: [i64; 2],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<MatchId>,
    ) -> MatchResult<()> {
        if let Some(clash) = self
            .matches
            .find_overlapping(team_ids, start, end, exclude)
            .await?
        {
            let team_id = team_ids
                .into_iter()
                .find(|t| clash.involves_team(*t))
                .unwrap_or(team_ids[0]);
            return Err(MatchError::ScheduleConflict {
                team_id,
                match_id: clash.id,
            });
        }
        Ok(())
    }
}

fn validate_window(start: DateTime<Utc>, end: DateTime<Utc>) -> MatchResult<()> {
    if start >= end {
        return Err(MatchError::Validation(
            "start_time must be before end_time".to_string(),
        ));
    }
    Ok(())
}
