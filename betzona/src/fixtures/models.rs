//! Match data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Match ID type
pub type MatchId = i64;

/// Match scheduling status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    Cancelled,
    Postponed,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Live => "live",
            MatchStatus::Finished => "finished",
            MatchStatus::Cancelled => "cancelled",
            MatchStatus::Postponed => "postponed",
        }
    }

    /// Finished and cancelled matches never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchStatus::Finished | MatchStatus::Cancelled)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(MatchStatus::Scheduled),
            "live" => Ok(MatchStatus::Live),
            "finished" => Ok(MatchStatus::Finished),
            "cancelled" => Ok(MatchStatus::Cancelled),
            "postponed" => Ok(MatchStatus::Postponed),
            other => Err(format!("unknown match status '{other}'")),
        }
    }
}

/// Why a match does not accept bets (or bet cancellations) right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BettingClosed {
    NotScheduled(MatchStatus),
    AlreadyStarted,
}

impl fmt::Display for BettingClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BettingClosed::NotScheduled(status) => {
                write!(f, "match not open for betting (status: {status})")
            }
            BettingClosed::AlreadyStarted => f.write_str("match already started"),
        }
    }
}

/// Match model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    /// Check the eligibility window: scheduled and not yet started at `now`
    pub fn ensure_open_for_betting(&self, now: DateTime<Utc>) -> Result<(), BettingClosed> {
        if self.status != MatchStatus::Scheduled {
            return Err(BettingClosed::NotScheduled(self.status));
        }
        if self.start_time <= now {
            return Err(BettingClosed::AlreadyStarted);
        }
        Ok(())
    }

    pub fn involves_team(&self, team_id: i64) -> bool {
        self.home_team_id == team_id || self.away_team_id == team_id
    }

    /// True when the two time windows intersect (closed intervals)
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time <= end && self.end_time >= start
    }
}

/// Match creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMatch {
    pub tournament_id: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub stadium: Option<String>,
    pub referee: Option<String>,
}

/// Partial match update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchUpdate {
    pub status: Option<MatchStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub stadium: Option<String>,
    pub referee: Option<String>,
}

/// Conjunctive match list filters
#[derive(Debug, Clone, Default)]
pub struct MatchFilter {
    pub status: Option<MatchStatus>,
    pub tournament_id: Option<i64>,
    pub team_id: Option<i64>,
    pub starts_from: Option<DateTime<Utc>>,
    pub ends_before: Option<DateTime<Utc>>,
}

impl MatchFilter {
    pub fn matches(&self, m: &Match) -> bool {
        self.status.is_none_or(|s| m.status == s)
            && self.tournament_id.is_none_or(|t| m.tournament_id == t)
            && self.team_id.is_none_or(|t| m.involves_team(t))
            && self.starts_from.is_none_or(|from| m.start_time >= from)
            && self.ends_before.is_none_or(|until| m.end_time < until)
    }
}
