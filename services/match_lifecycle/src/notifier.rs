use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info};

use crate::auth::ServiceAccountTokenSource;
use crate::config::{NotificationConfig, SiteConfig};
use crate::error::ClientError;

/// "This URL changed" hint to a search-index notification service.
#[async_trait]
pub trait IndexNotifier: Send + Sync {
    async fn notify_updated(&self, url: &str) -> Result<(), ClientError>;
}

#[derive(Debug, Serialize)]
struct UrlNotification<'a> {
    url: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

enum Credentials {
    ServiceAccount(ServiceAccountTokenSource),
    Static(String),
    Missing,
}

/// Client for an Indexing-API style `urlNotifications:publish` endpoint.
pub struct IndexingApiClient {
    client: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
}

impl IndexingApiClient {
    pub fn new(config: &NotificationConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let credentials = match (&config.service_account, &config.access_token) {
            (Some(account), _) => {
                Credentials::ServiceAccount(ServiceAccountTokenSource::new(client.clone(), account)?)
            }
            (None, Some(token)) => Credentials::Static(token.clone()),
            (None, None) => Credentials::Missing,
        };

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            credentials,
        })
    }

    async fn bearer_token(&self) -> Result<String, ClientError> {
        match &self.credentials {
            Credentials::ServiceAccount(source) => source.access_token().await,
            Credentials::Static(token) => Ok(token.clone()),
            Credentials::Missing => Err(ClientError::NotConfigured("indexing credentials")),
        }
    }
}

#[async_trait]
impl IndexNotifier for IndexingApiClient {
    async fn notify_updated(&self, url: &str) -> Result<(), ClientError> {
        let token = self.bearer_token().await?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&UrlNotification {
                url,
                kind: "URL_UPDATED",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!(url, status = status.as_u16(), "Indexing notification accepted");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub attempted: usize,
    pub succeeded: usize,
}

impl DispatchOutcome {
    pub fn reached(&self, threshold: usize) -> bool {
        self.attempted > 0 && self.succeeded >= threshold.max(1)
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Submits URLs one at a time, spaced by a minimum interval that holds across
/// every caller sharing this dispatcher.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn IndexNotifier>,
    limiter: Option<Arc<DirectLimiter>>,
    site: SiteConfig,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn IndexNotifier>, config: &NotificationConfig, site: SiteConfig) -> Self {
        let limiter = Quota::with_period(config.min_call_interval())
            .map(|quota| Arc::new(RateLimiter::direct(quota)));

        Self {
            notifier,
            limiter,
            site,
        }
    }

    pub async fn submit_all(&self, urls: &[String]) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for url in urls {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            outcome.attempted += 1;
            match self.notifier.notify_updated(url).await {
                Ok(()) => outcome.succeeded += 1,
                Err(e) => error!(url = %url, error = %e, "Indexing notification failed"),
            }
        }

        outcome
    }

    /// Notifies every locale variant of the canonical match URL.
    pub async fn notify_match(&self, match_id: &str) -> DispatchOutcome {
        let outcome = self.submit_all(&self.site.match_urls(match_id)).await;
        info!(
            match_id,
            succeeded = outcome.succeeded,
            attempted = outcome.attempted,
            "Notified locales for match"
        );
        outcome
    }
}
