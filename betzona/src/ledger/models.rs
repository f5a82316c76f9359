//! Bet ledger data models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::{auth::UserId, fixtures::MatchId};

/// Bet ID type
pub type BetId = i64;

/// Bet type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetType {
    Win,
    Draw,
    Loss,
    OverUnder,
    Corners,
    Cards,
    Goals,
    FirstGoal,
    ExactScore,
    AsianHandicap,
    BothTeamsScore,
    TotalGoals,
}

impl BetType {
    pub const ALL: [BetType; 12] = [
        BetType::Win,
        BetType::Draw,
        BetType::Loss,
        BetType::OverUnder,
        BetType::Corners,
        BetType::Cards,
        BetType::Goals,
        BetType::FirstGoal,
        BetType::ExactScore,
        BetType::AsianHandicap,
        BetType::BothTeamsScore,
        BetType::TotalGoals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BetType::Win => "win",
            BetType::Draw => "draw",
            BetType::Loss => "loss",
            BetType::OverUnder => "over_under",
            BetType::Corners => "corners",
            BetType::Cards => "cards",
            BetType::Goals => "goals",
            BetType::FirstGoal => "first_goal",
            BetType::ExactScore => "exact_score",
            BetType::AsianHandicap => "asian_handicap",
            BetType::BothTeamsScore => "both_teams_score",
            BetType::TotalGoals => "total_goals",
        }
    }
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BetType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown bet type '{s}'"))
    }
}

/// Bet status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
    Cancelled,
}

impl BetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Pending => "pending",
            BetStatus::Won => "won",
            BetStatus::Lost => "lost",
            BetStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BetStatus::Pending),
            "won" => Ok(BetStatus::Won),
            "lost" => Ok(BetStatus::Lost),
            "cancelled" => Ok(BetStatus::Cancelled),
            other => Err(format!("unknown bet status '{other}'")),
        }
    }
}

/// Bet model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: BetId,
    pub user_id: UserId,
    pub match_id: MatchId,
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

/// Balance view of a user, as seen by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Account {
    pub user_id: UserId,
    pub balance: Decimal,
}

/// Bet placement request, as received from a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceBetRequest {
    pub match_id: MatchId,
    pub bet_type: String,
    pub amount: Decimal,
    pub odds: Decimal,
    pub promotion_id: Option<i64>,
}

/// Validated bet ready to be written by a repository
#[derive(Debug, Clone)]
pub struct NewBet {
    pub user_id: UserId,
    pub match_id: MatchId,
    pub bet_type: BetType,
    pub amount: Decimal,
    pub odds: Decimal,
    pub promotion_id: Option<i64>,
}

/// Outcome of a committed cancellation
#[derive(Debug, Clone)]
pub struct CancelledBet {
    pub bet: Bet,
    pub balance_after: Decimal,
}

/// Conjunctive bet list filters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BetFilter {
    pub status: Option<BetStatus>,
    pub match_id: Option<MatchId>,
    pub bet_type: Option<BetType>,
    /// First calendar day (UTC) included
    pub from_date: Option<NaiveDate>,
    /// Last calendar day (UTC) included
    pub to_date: Option<NaiveDate>,
}

impl BetFilter {
    /// Lower bound on `created_at`, inclusive
    pub fn created_from(&self) -> Option<DateTime<Utc>> {
        self.from_date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }

    /// Upper bound on `created_at`, exclusive (start of the day after `to_date`)
    pub fn created_before(&self) -> Option<DateTime<Utc>> {
        self.to_date
            .and_then(|d| d.succ_opt())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }

    pub fn matches(&self, bet: &Bet) -> bool {
        self.status.is_none_or(|s| bet.status == s)
            && self.match_id.is_none_or(|m| bet.match_id == m)
            && self.bet_type.is_none_or(|t| bet.bet_type == t)
            && self.created_from().is_none_or(|from| bet.created_at >= from)
            && self.created_before().is_none_or(|until| bet.created_at < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bet_type_parse_all() {
        for t in BetType::ALL {
            assert_eq!(t.as_str().parse::<BetType>().unwrap(), t);
        }
        assert!("moneyline".parse::<BetType>().is_err());
    }

    #[test]
    fn test_bet_type_serde_matches_as_str() {
        let json = serde_json::to_string(&BetType::BothTeamsScore).unwrap();
        assert_eq!(json, "\"both_teams_score\"");
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let filter = BetFilter {
            from_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            to_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            ..Default::default()
        };
        let from = filter.created_from().unwrap();
        let until = filter.created_before().unwrap();
        assert_eq!(until - from, chrono::Duration::days(1));
    }
}
