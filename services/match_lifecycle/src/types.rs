use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Completed,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Live => "live",
            MatchStatus::Completed => "completed",
        }
    }

    /// Position along `scheduled -> live -> completed`.
    fn rank(&self) -> u8 {
        match self {
            MatchStatus::Scheduled => 0,
            MatchStatus::Live => 1,
            MatchStatus::Completed => 2,
        }
    }

    pub fn is_regression_from(&self, previous: MatchStatus) -> bool {
        self.rank() < previous.rank()
    }

    /// Scores are only compared once a match has kicked off.
    pub fn carries_score(&self) -> bool {
        matches!(self, MatchStatus::Live | MatchStatus::Completed)
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
            "completed" => Ok(MatchStatus::Completed),
            other => Err(format!("unknown match status: {other}")),
        }
    }
}

/// One row of the upstream slate as seen on a single poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolledMatch {
    pub match_id: String,
    pub status: MatchStatus,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub home_score: u32,
    pub away_score: u32,
}

impl PolledMatch {
    pub fn score_line(&self) -> String {
        format!("{}-{}", self.home_score, self.away_score)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchState {
    pub match_id: String,
    pub status: MatchStatus,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub home_score: u32,
    pub away_score: u32,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub last_checked_at: DateTime<Utc>,
}

impl MatchState {
    pub fn observed(polled: &PolledMatch, checked_at: DateTime<Utc>) -> Self {
        Self {
            match_id: polled.match_id.clone(),
            status: polled.status,
            home_team: polled.home_team.clone(),
            away_team: polled.away_team.clone(),
            home_score: polled.home_score,
            away_score: polled.away_score,
            last_indexed_at: None,
            last_checked_at: checked_at,
        }
    }

    pub fn score_line(&self) -> String {
        format!("{}-{}", self.home_score, self.away_score)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub url: String,
    pub submitted_at: DateTime<Utc>,
    pub indexing_status: String,
    pub last_checked_at: DateTime<Utc>,
}

impl SubmissionRecord {
    pub fn submitted(url: String, at: DateTime<Utc>) -> Self {
        Self {
            url,
            submitted_at: at,
            indexing_status: "submitted".to_string(),
            last_checked_at: at,
        }
    }
}

/// Entry of the persistent fixture schedule read by the kickoff job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledMatch {
    pub match_id: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff_at: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    NewMatch,
    StatusChange { from: MatchStatus, to: MatchStatus },
    ScoreUpdate,
    Unchanged,
}

impl ChangeKind {
    pub fn is_change(&self) -> bool {
        !matches!(self, ChangeKind::Unchanged)
    }

    pub fn label(&self) -> String {
        match self {
            ChangeKind::NewMatch => "new_match".to_string(),
            ChangeKind::StatusChange { from, to } => format!("status_change_{from}_to_{to}"),
            ChangeKind::ScoreUpdate => "score_update".to_string(),
            ChangeKind::Unchanged => "unchanged".to_string(),
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [MatchStatus::Scheduled, MatchStatus::Live, MatchStatus::Completed] {
            assert_eq!(status.as_str().parse::<MatchStatus>().unwrap(), status);
        }
        assert!("postponed".parse::<MatchStatus>().is_err());
    }

    #[test]
    fn test_regression_detection() {
        assert!(MatchStatus::Scheduled.is_regression_from(MatchStatus::Live));
        assert!(MatchStatus::Live.is_regression_from(MatchStatus::Completed));
        assert!(!MatchStatus::Completed.is_regression_from(MatchStatus::Live));
        assert!(!MatchStatus::Live.is_regression_from(MatchStatus::Live));
    }

    #[test]
    fn test_change_labels() {
        assert_eq!(ChangeKind::NewMatch.label(), "new_match");
        assert_eq!(
            ChangeKind::StatusChange {
                from: MatchStatus::Scheduled,
                to: MatchStatus::Live
            }
            .label(),
            "status_change_scheduled_to_live"
        );
        assert_eq!(ChangeKind::ScoreUpdate.to_string(), "score_update");
        assert!(!ChangeKind::Unchanged.is_change());
    }
}
