//! Pre-kickoff submission of match pages for matches about to start.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{KickoffConfig, SiteConfig};
use crate::error::{ClientError, PipelineError, StoreError};
use crate::notifier::NotificationDispatcher;
use crate::store::MatchStore;
use crate::types::{ScheduledMatch, SubmissionRecord};

/// Fetches a page so the rendering tier has it cached before crawlers arrive.
#[async_trait]
pub trait PageWarmer: Send + Sync {
    async fn warm(&self, url: &str) -> Result<(), ClientError>;
}

pub struct HttpPageWarmer {
    client: reqwest::Client,
}

impl HttpPageWarmer {
    pub fn new(config: &KickoffConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.warmup_user_agent)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageWarmer for HttpPageWarmer {
    async fn warm(&self, url: &str) -> Result<(), ClientError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: format!("page fetch failed: {}", status),
            });
        }
        Ok(())
    }
}

/// Kickoff range `[now + lead_min, now + lead_max]` scanned by one run.
pub fn lead_window(now: DateTime<Utc>, config: &KickoffConfig) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        now + ChronoDuration::minutes(config.lead_min_minutes),
        now + ChronoDuration::minutes(config.lead_max_minutes),
    )
}

#[derive(Debug, Error)]
enum PreSubmitError {
    #[error("warm-up failed: {0}")]
    WarmUp(#[source] ClientError),

    #[error("indexing accepted {succeeded} of {attempted} URLs")]
    Indexing { succeeded: usize, attempted: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KickoffError {
    pub match_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KickoffReport {
    pub timestamp: DateTime<Utc>,
    pub matches_found: usize,
    pub submitted: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<KickoffError>,
    pub deadline_exceeded: bool,
}

impl KickoffReport {
    fn new(timestamp: DateTime<Utc>, matches_found: usize) -> Self {
        Self {
            timestamp,
            matches_found,
            submitted: Vec::new(),
            skipped: Vec::new(),
            errors: Vec::new(),
            deadline_exceeded: false,
        }
    }
}

pub struct KickoffPreSubmitter {
    store: Arc<dyn MatchStore>,
    warmer: Arc<dyn PageWarmer>,
    dispatcher: NotificationDispatcher,
    site: SiteConfig,
    config: KickoffConfig,
    deadline: Duration,
    min_successful_locales: usize,
}

impl KickoffPreSubmitter {
    pub fn new(
        store: Arc<dyn MatchStore>,
        warmer: Arc<dyn PageWarmer>,
        dispatcher: NotificationDispatcher,
        site: SiteConfig,
        config: KickoffConfig,
        deadline: Duration,
        min_successful_locales: usize,
    ) -> Self {
        Self {
            store,
            warmer,
            dispatcher,
            site,
            config,
            deadline,
            min_successful_locales,
        }
    }

    /// Submits every upcoming match in the lead window whose canonical URL has
    /// not been submitted before.
    pub async fn run(&self) -> Result<KickoffReport, PipelineError> {
        let started = Instant::now();
        let now = Utc::now();
        let (from, to) = lead_window(now, &self.config);

        let upcoming = self.store.upcoming_matches(from, to).await?;
        let mut already_submitted = self
            .store
            .submitted_urls(&self.site.match_url_prefix())
            .await?;
        info!(
            matches = upcoming.len(),
            known_urls = already_submitted.len(),
            "Scanning matches ahead of kickoff"
        );

        let mut report = KickoffReport::new(now, upcoming.len());
        let delay = Duration::from_millis(self.config.delay_between_matches_ms);

        for (i, fixture) in upcoming.iter().enumerate() {
            if started.elapsed() >= self.deadline {
                warn!(
                    remaining = upcoming.len() - i,
                    "Pre-submit deadline exceeded, leaving remaining matches for the next run"
                );
                report.deadline_exceeded = true;
                break;
            }

            let canonical = self.site.canonical_match_url(&fixture.match_id);
            if already_submitted.contains(&canonical) {
                if let Err(e) = self.store.touch_submission(&canonical, Utc::now()).await {
                    warn!(url = %canonical, error = %e, "Failed to refresh submission record");
                }
                info!(match_id = %fixture.match_id, "Already submitted, skipping");
                report.skipped.push(fixture.match_id.clone());
                continue;
            }

            match self.presubmit(fixture, &canonical).await {
                Ok(()) => {
                    info!(
                        match_id = %fixture.match_id,
                        home = %fixture.home_team,
                        away = %fixture.away_team,
                        kickoff = %fixture.kickoff_at,
                        "Match pages submitted ahead of kickoff"
                    );
                    already_submitted.insert(canonical);
                    report.submitted.push(fixture.match_id.clone());
                }
                Err(e) => {
                    error!(match_id = %fixture.match_id, error = %e, "Pre-submission failed");
                    report.errors.push(KickoffError {
                        match_id: fixture.match_id.clone(),
                        error: e.to_string(),
                    });
                }
            }

            if i + 1 < upcoming.len() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        info!(
            submitted = report.submitted.len(),
            skipped = report.skipped.len(),
            errors = report.errors.len(),
            "Pre-submit pass complete"
        );
        Ok(report)
    }

    async fn presubmit(&self, fixture: &ScheduledMatch, canonical: &str) -> Result<(), PreSubmitError> {
        let seo_urls: Vec<String> = self
            .site
            .locales
            .iter()
            .map(|locale| {
                self.site
                    .seo_match_url(&fixture.home_team, &fixture.away_team, &fixture.match_id, locale)
            })
            .collect();

        let warm_url = self.site.seo_match_url(
            &fixture.home_team,
            &fixture.away_team,
            &fixture.match_id,
            &self.site.default_locale,
        );
        self.warmer.warm(&warm_url).await.map_err(PreSubmitError::WarmUp)?;

        let outcome = self.dispatcher.submit_all(&seo_urls).await;
        if !outcome.reached(self.min_successful_locales) {
            return Err(PreSubmitError::Indexing {
                succeeded: outcome.succeeded,
                attempted: outcome.attempted,
            });
        }

        self.store
            .record_submission(&SubmissionRecord::submitted(canonical.to_string(), Utc::now()))
            .await?;
        Ok(())
    }
}
