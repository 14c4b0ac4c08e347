//! One poll cycle: fetch the slate, diff it against the store, then notify,
//! invalidate and persist match by match.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::config::CycleConfig;
use crate::detector::{plan_cycle, Action, MatchPlan};
use crate::error::PipelineError;
use crate::invalidation::InvalidationBroadcaster;
use crate::notifier::NotificationDispatcher;
use crate::poller::ScoreSource;
use crate::store::MatchStore;
use crate::types::MatchStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    pub match_id: String,
    pub change_type: String,
    pub old_status: Option<MatchStatus>,
    pub new_status: MatchStatus,
    pub old_score: Option<String>,
    pub new_score: String,
}

impl ChangeRecord {
    fn from_plan(plan: &MatchPlan) -> Self {
        Self {
            match_id: plan.match_id().to_string(),
            change_type: plan.change.label(),
            old_status: plan.previous.as_ref().map(|p| p.status),
            new_status: plan.next_state.status,
            old_score: plan.previous.as_ref().map(|p| p.score_line()),
            new_score: plan.next_state.score_line(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub timestamp: DateTime<Utc>,
    pub total_matches: usize,
    pub changes: Vec<ChangeRecord>,
    /// Matches whose notification reached the locale threshold.
    pub indexed: usize,
    /// Locale paths successfully invalidated.
    pub invalidated: usize,
    pub errors: Vec<String>,
    pub deadline_exceeded: bool,
}

impl CycleReport {
    fn new(timestamp: DateTime<Utc>, total_matches: usize) -> Self {
        Self {
            timestamp,
            total_matches,
            changes: Vec::new(),
            indexed: 0,
            invalidated: 0,
            errors: Vec::new(),
            deadline_exceeded: false,
        }
    }
}

pub struct MatchMonitor {
    source: Arc<dyn ScoreSource>,
    store: Arc<dyn MatchStore>,
    dispatcher: NotificationDispatcher,
    broadcaster: InvalidationBroadcaster,
    cycle: CycleConfig,
    min_successful_locales: usize,
}

impl MatchMonitor {
    pub fn new(
        source: Arc<dyn ScoreSource>,
        store: Arc<dyn MatchStore>,
        dispatcher: NotificationDispatcher,
        broadcaster: InvalidationBroadcaster,
        cycle: CycleConfig,
        min_successful_locales: usize,
    ) -> Self {
        Self {
            source,
            store,
            dispatcher,
            broadcaster,
            cycle,
            min_successful_locales,
        }
    }

    /// Runs one cycle over the whole slate.
    ///
    /// Fails without touching the store when the slate cannot be fetched.
    /// Per-match failures (notification, invalidation, store writes) are
    /// logged and collected in the report instead.
    pub async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
        let started = Instant::now();
        let deadline = self.cycle.deadline();

        let slate = match tokio::time::timeout(deadline, self.source.fetch_slate()).await {
            Ok(Ok(slate)) => slate,
            Ok(Err(e)) => {
                error!(error = %e, "Failed to fetch live scores, aborting cycle");
                return Err(PipelineError::Upstream(e));
            }
            Err(_) => {
                error!(deadline_secs = self.cycle.deadline_secs, "Live score fetch hit the deadline");
                return Err(PipelineError::Deadline(self.cycle.deadline_secs));
            }
        };

        let stored = self.store.load_match_states().await?;
        let now = Utc::now();
        let plans = plan_cycle(&slate, &stored, self.cycle.regression_policy, now);
        let mut report = CycleReport::new(now, slate.len());

        for plan in plans {
            if started.elapsed() >= deadline {
                warn!(
                    processed = report.changes.len(),
                    "Cycle deadline exceeded, leaving remaining matches for the next run"
                );
                report.deadline_exceeded = true;
                break;
            }
            self.execute(plan, &mut report).await;
        }

        info!(
            total = report.total_matches,
            changes = report.changes.len(),
            indexed = report.indexed,
            errors = report.errors.len(),
            "Match monitoring cycle complete"
        );
        Ok(report)
    }

    async fn execute(&self, plan: MatchPlan, report: &mut CycleReport) {
        let match_id = plan.match_id().to_string();
        let mut next_state = plan.next_state.clone();

        match plan.action {
            Action::Propagate => {
                info!(
                    match_id = %match_id,
                    change = %plan.change,
                    score = %next_state.score_line(),
                    "Match change detected"
                );

                let outcome = self.dispatcher.notify_match(&match_id).await;
                if outcome.reached(self.min_successful_locales) {
                    next_state.last_indexed_at = Some(Utc::now());
                    report.indexed += 1;
                } else {
                    warn!(
                        match_id = %match_id,
                        succeeded = outcome.succeeded,
                        attempted = outcome.attempted,
                        "Not enough locales notified, match not marked indexed"
                    );
                }

                let invalidation = self.broadcaster.invalidate_match(&match_id).await;
                report.invalidated += invalidation.invalidated.len();
                report.changes.push(ChangeRecord::from_plan(&plan));
            }
            Action::Touch if plan.change.is_change() => {
                warn!(
                    match_id = %match_id,
                    change = %plan.change,
                    "Ignoring backward status transition"
                );
            }
            Action::Touch => {}
        }

        if let Err(e) = self.store.upsert_match_state(&next_state).await {
            error!(match_id = %match_id, error = %e, "Failed to store match state");
            report.errors.push(format!("{match_id}: {e}"));
        }
    }
}
