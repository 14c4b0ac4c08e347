#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use match_lifecycle::{
    config::PipelineConfig,
    invalidation::CacheInvalidator,
    kickoff::PageWarmer,
    notifier::IndexNotifier,
    poller::ScoreSource,
    types::{MatchState, MatchStatus, PolledMatch, ScheduledMatch, SubmissionRecord},
    ClientError, Collaborators, MatchStore, MemoryStore, Pipeline, StoreError,
};

#[derive(Default)]
pub struct FakeSource {
    slate: Mutex<Vec<PolledMatch>>,
    failing: Mutex<bool>,
}

impl FakeSource {
    pub fn set(&self, slate: Vec<PolledMatch>) {
        *self.slate.lock().unwrap() = slate;
        *self.failing.lock().unwrap() = false;
    }

    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }
}

#[async_trait]
impl ScoreSource for FakeSource {
    async fn fetch_slate(&self) -> Result<Vec<PolledMatch>, ClientError> {
        if *self.failing.lock().unwrap() {
            return Err(ClientError::Api {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        Ok(self.slate.lock().unwrap().clone())
    }
}

/// Records every call. URLs containing any of `failing` are rejected.
#[derive(Default)]
pub struct RecordingNotifier {
    pub calls: Mutex<Vec<String>>,
    pub failing: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn fail_when_contains(&self, needle: &str) {
        self.failing.lock().unwrap().push(needle.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl IndexNotifier for RecordingNotifier {
    async fn notify_updated(&self, url: &str) -> Result<(), ClientError> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.failing.lock().unwrap().iter().any(|n| url.contains(n.as_str())) {
            return Err(ClientError::Api {
                status: 429,
                message: "quota exceeded".to_string(),
            });
        }
        Ok(())
    }
}

/// Records every path. Paths containing any of `failing` are rejected and
/// not recorded.
#[derive(Default)]
pub struct RecordingInvalidator {
    pub paths: Mutex<Vec<String>>,
    pub failing: Mutex<Vec<String>>,
}

impl RecordingInvalidator {
    pub fn fail_when_contains(&self, needle: &str) {
        self.failing.lock().unwrap().push(needle.to_string());
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.paths.lock().unwrap().clear();
    }
}

#[async_trait]
impl CacheInvalidator for RecordingInvalidator {
    async fn invalidate(&self, path: &str) -> Result<(), ClientError> {
        if self.failing.lock().unwrap().iter().any(|n| path.contains(n.as_str())) {
            return Err(ClientError::Api {
                status: 500,
                message: "revalidation failed".to_string(),
            });
        }
        self.paths.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingWarmer {
    pub urls: Mutex<Vec<String>>,
    pub failing: Mutex<bool>,
}

#[async_trait]
impl PageWarmer for RecordingWarmer {
    async fn warm(&self, url: &str) -> Result<(), ClientError> {
        self.urls.lock().unwrap().push(url.to_string());
        if *self.failing.lock().unwrap() {
            return Err(ClientError::Api {
                status: 404,
                message: "page fetch failed".to_string(),
            });
        }
        Ok(())
    }
}

/// Delegates to a `MemoryStore`, except that match-state writes for the
/// ids in `failing` are refused.
pub struct FailingStore {
    pub inner: Arc<MemoryStore>,
    pub failing: Mutex<Vec<String>>,
}

impl FailingStore {
    pub fn fail_upserts_for(&self, match_id: &str) {
        self.failing.lock().unwrap().push(match_id.to_string());
    }
}

#[async_trait]
impl MatchStore for FailingStore {
    async fn load_match_states(&self) -> Result<HashMap<String, MatchState>, StoreError> {
        self.inner.load_match_states().await
    }

    async fn upsert_match_state(&self, state: &MatchState) -> Result<(), StoreError> {
        let refused = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|id| *id == state.match_id);
        if refused {
            return Err(StoreError::Corrupt {
                key: state.match_id.clone(),
                reason: "write rejected".to_string(),
            });
        }
        self.inner.upsert_match_state(state).await
    }

    async fn submitted_urls(&self, prefix: &str) -> Result<HashSet<String>, StoreError> {
        self.inner.submitted_urls(prefix).await
    }

    async fn touch_submission(&self, url: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.touch_submission(url, at).await
    }

    async fn record_submission(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        self.inner.record_submission(record).await
    }

    async fn upcoming_matches(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScheduledMatch>, StoreError> {
        self.inner.upcoming_matches(from, to).await
    }
}

pub struct Harness {
    pub config: PipelineConfig,
    pub store: Arc<MemoryStore>,
    pub writes: Arc<FailingStore>,
    pub source: Arc<FakeSource>,
    pub notifier: Arc<RecordingNotifier>,
    pub invalidator: Arc<RecordingInvalidator>,
    pub warmer: Arc<RecordingWarmer>,
    pub pipeline: Pipeline,
}

impl Harness {
    pub fn reset_calls(&self) {
        self.notifier.reset();
        self.invalidator.reset();
    }
}

/// Config with rate limiting and inter-match delays switched off.
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.notification.min_call_interval_ms = 0;
    config.kickoff.delay_between_matches_ms = 0;
    config.server.webhook_secret = Some("hook-secret".to_string());
    config
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: PipelineConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let writes = Arc::new(FailingStore {
        inner: store.clone(),
        failing: Mutex::new(Vec::new()),
    });
    let source = Arc::new(FakeSource::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let invalidator = Arc::new(RecordingInvalidator::default());
    let warmer = Arc::new(RecordingWarmer::default());

    let pipeline = Pipeline::assemble(
        &config,
        writes.clone(),
        Collaborators {
            source: source.clone(),
            notifier: notifier.clone(),
            invalidator: invalidator.clone(),
            warmer: warmer.clone(),
        },
    );

    Harness {
        config,
        store,
        writes,
        source,
        notifier,
        invalidator,
        warmer,
        pipeline,
    }
}

pub fn polled(id: &str, status: MatchStatus, home: u32, away: u32) -> PolledMatch {
    PolledMatch {
        match_id: id.to_string(),
        status,
        home_team: Some("Senegal".to_string()),
        away_team: Some("Congo DR".to_string()),
        home_score: home,
        away_score: away,
    }
}

pub fn fixture_in(id: &str, minutes_from_now: i64) -> ScheduledMatch {
    ScheduledMatch {
        match_id: id.to_string(),
        home_team: "Senegal".to_string(),
        away_team: "Congo DR".to_string(),
        kickoff_at: Utc::now() + Duration::minutes(minutes_from_now),
        status: "scheduled".to_string(),
    }
}
