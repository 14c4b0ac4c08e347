//! The `MatchStore` trait and an in-process implementation.
//!
//! Every write is an upsert keyed by a natural identifier (match id or URL),
//! so concurrent invocations and retries need no extra coordination.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::types::{MatchState, ScheduledMatch, SubmissionRecord};

/// Schedule statuses that mean the match has not kicked off.
pub const NOT_STARTED_STATUSES: [&str; 2] = ["scheduled", "not_started"];

#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Every stored match state, keyed by match id.
    async fn load_match_states(&self) -> Result<HashMap<String, MatchState>, StoreError>;

    /// Insert or replace the row for `state.match_id`. A `None`
    /// `last_indexed_at` keeps whatever value is already stored.
    async fn upsert_match_state(&self, state: &MatchState) -> Result<(), StoreError>;

    /// URLs of submission records starting with `prefix`.
    async fn submitted_urls(&self, prefix: &str) -> Result<HashSet<String>, StoreError>;

    /// Refresh `last_checked_at` on an existing submission record.
    async fn touch_submission(&self, url: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Insert the record; an existing row for the URL only gets its
    /// `last_checked_at` refreshed.
    async fn record_submission(&self, record: &SubmissionRecord) -> Result<(), StoreError>;

    /// Not-yet-started scheduled matches with kickoff in `[from, to]`,
    /// earliest first.
    async fn upcoming_matches(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScheduledMatch>, StoreError>;
}

#[derive(Default)]
struct Tables {
    states: HashMap<String, MatchState>,
    submissions: HashMap<String, SubmissionRecord>,
    schedule: Vec<ScheduledMatch>,
}

/// `MatchStore` kept in memory. Used by tests and for dry runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_scheduled(&self, fixture: ScheduledMatch) {
        self.tables.lock().await.schedule.push(fixture);
    }

    pub async fn match_state(&self, match_id: &str) -> Option<MatchState> {
        self.tables.lock().await.states.get(match_id).cloned()
    }

    pub async fn submission(&self, url: &str) -> Option<SubmissionRecord> {
        self.tables.lock().await.submissions.get(url).cloned()
    }

    pub async fn submission_count(&self) -> usize {
        self.tables.lock().await.submissions.len()
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn load_match_states(&self) -> Result<HashMap<String, MatchState>, StoreError> {
        Ok(self.tables.lock().await.states.clone())
    }

    async fn upsert_match_state(&self, state: &MatchState) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let mut row = state.clone();
        if row.last_indexed_at.is_none() {
            row.last_indexed_at = tables
                .states
                .get(&state.match_id)
                .and_then(|existing| existing.last_indexed_at);
        }
        tables.states.insert(row.match_id.clone(), row);
        Ok(())
    }

    async fn submitted_urls(&self, prefix: &str) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .submissions
            .keys()
            .filter(|url| url.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn touch_submission(&self, url: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(record) = self.tables.lock().await.submissions.get_mut(url) {
            record.last_checked_at = at;
        }
        Ok(())
    }

    async fn record_submission(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        self.tables
            .lock()
            .await
            .submissions
            .entry(record.url.clone())
            .and_modify(|existing| existing.last_checked_at = record.last_checked_at)
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn upcoming_matches(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScheduledMatch>, StoreError> {
        let mut upcoming: Vec<ScheduledMatch> = self
            .tables
            .lock()
            .await
            .schedule
            .iter()
            .filter(|m| m.kickoff_at >= from && m.kickoff_at <= to)
            .filter(|m| NOT_STARTED_STATUSES.contains(&m.status.as_str()))
            .cloned()
            .collect();
        upcoming.sort_by_key(|m| m.kickoff_at);
        Ok(upcoming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchStatus, PolledMatch};
    use chrono::Duration;

    fn state(id: &str, indexed: Option<DateTime<Utc>>) -> MatchState {
        let polled = PolledMatch {
            match_id: id.to_string(),
            status: MatchStatus::Live,
            home_team: None,
            away_team: None,
            home_score: 0,
            away_score: 0,
        };
        MatchState {
            last_indexed_at: indexed,
            ..MatchState::observed(&polled, Utc::now())
        }
    }

    #[tokio::test]
    async fn test_upsert_preserves_last_indexed_at() {
        let store = MemoryStore::new();
        let indexed = Utc::now() - Duration::minutes(5);

        store.upsert_match_state(&state("A", Some(indexed))).await.unwrap();
        store.upsert_match_state(&state("A", None)).await.unwrap();

        let row = store.match_state("A").await.unwrap();
        assert_eq!(row.last_indexed_at, Some(indexed));
    }

    #[tokio::test]
    async fn test_record_submission_is_insert_once() {
        let store = MemoryStore::new();
        let first = Utc::now() - Duration::hours(1);
        let later = Utc::now();

        store
            .record_submission(&SubmissionRecord::submitted("https://x.test/m/1".into(), first))
            .await
            .unwrap();
        store
            .record_submission(&SubmissionRecord::submitted("https://x.test/m/1".into(), later))
            .await
            .unwrap();

        let record = store.submission("https://x.test/m/1").await.unwrap();
        assert_eq!(record.submitted_at, first);
        assert_eq!(record.last_checked_at, later);
        assert_eq!(store.submission_count().await, 1);
    }

    #[tokio::test]
    async fn test_submitted_urls_filters_by_prefix() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for url in ["https://x.test/m/1", "https://x.test/m/2", "https://x.test/news/3"] {
            store
                .record_submission(&SubmissionRecord::submitted(url.to_string(), now))
                .await
                .unwrap();
        }

        let urls = store.submitted_urls("https://x.test/m/").await.unwrap();
        assert_eq!(urls.len(), 2);
        assert!(!urls.contains("https://x.test/news/3"));
    }

    #[tokio::test]
    async fn test_upcoming_matches_window_and_status() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let fixture = |id: &str, hours: i64, status: &str| ScheduledMatch {
            match_id: id.to_string(),
            home_team: "Nigeria".to_string(),
            away_team: "Tunisia".to_string(),
            kickoff_at: now + Duration::hours(hours),
            status: status.to_string(),
        };
        store.add_scheduled(fixture("late", 3, "scheduled")).await;
        store.add_scheduled(fixture("early", 2, "not_started")).await;
        store.add_scheduled(fixture("too-far", 6, "scheduled")).await;
        store.add_scheduled(fixture("started", 3, "live")).await;

        let upcoming = store
            .upcoming_matches(now + Duration::minutes(90), now + Duration::hours(4))
            .await
            .unwrap();
        let ids: Vec<&str> = upcoming.iter().map(|m| m.match_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }
}
