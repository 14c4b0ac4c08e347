//! Change detection: diffs a polled slate against stored state and produces
//! a plan of per-match actions. Pure; no I/O.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::config::RegressionPolicy;
use crate::types::{ChangeKind, MatchState, PolledMatch};

pub fn classify(stored: Option<&MatchState>, polled: &PolledMatch) -> ChangeKind {
    let Some(stored) = stored else {
        return ChangeKind::NewMatch;
    };

    if stored.status != polled.status {
        return ChangeKind::StatusChange {
            from: stored.status,
            to: polled.status,
        };
    }

    let score_moved =
        stored.home_score != polled.home_score || stored.away_score != polled.away_score;
    if polled.status.carries_score() && score_moved {
        return ChangeKind::ScoreUpdate;
    }

    ChangeKind::Unchanged
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Notify the indexing service and invalidate the match pages.
    Propagate,
    /// Only persist the refreshed `last_checked_at`.
    Touch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPlan {
    pub change: ChangeKind,
    pub action: Action,
    pub previous: Option<MatchState>,
    /// Row to write once the action has run. `last_indexed_at` carries the
    /// previous value and is bumped by the executor on a successful
    /// notification.
    pub next_state: MatchState,
}

impl MatchPlan {
    pub fn match_id(&self) -> &str {
        &self.next_state.match_id
    }
}

fn plan_one(
    previous: Option<&MatchState>,
    polled: &PolledMatch,
    policy: RegressionPolicy,
    now: DateTime<Utc>,
) -> MatchPlan {
    let change = classify(previous, polled);

    let regression_ignored = matches!(
        (policy, change),
        (RegressionPolicy::Ignore, ChangeKind::StatusChange { from, to }) if to.is_regression_from(from)
    );

    let next_state = match previous {
        Some(previous) if regression_ignored => MatchState {
            last_checked_at: now,
            ..previous.clone()
        },
        Some(previous) => MatchState {
            // Keep names we already know when the feed drops them.
            home_team: polled.home_team.clone().or_else(|| previous.home_team.clone()),
            away_team: polled.away_team.clone().or_else(|| previous.away_team.clone()),
            last_indexed_at: previous.last_indexed_at,
            ..MatchState::observed(polled, now)
        },
        None => MatchState::observed(polled, now),
    };

    let action = if change.is_change() && !regression_ignored {
        Action::Propagate
    } else {
        Action::Touch
    };

    MatchPlan {
        change,
        action,
        previous: previous.cloned(),
        next_state,
    }
}

/// Plans every match of the slate in order. A match id repeated within the
/// slate is diffed against the state planned for its earlier occurrence.
pub fn plan_cycle(
    slate: &[PolledMatch],
    stored: &HashMap<String, MatchState>,
    policy: RegressionPolicy,
    now: DateTime<Utc>,
) -> Vec<MatchPlan> {
    let mut planned: HashMap<&str, MatchState> = HashMap::new();
    let mut plans = Vec::with_capacity(slate.len());

    for polled in slate {
        let previous = planned
            .get(polled.match_id.as_str())
            .or_else(|| stored.get(&polled.match_id));
        let plan = plan_one(previous, polled, policy, now);
        planned.insert(polled.match_id.as_str(), plan.next_state.clone());
        plans.push(plan);
    }

    plans
}
