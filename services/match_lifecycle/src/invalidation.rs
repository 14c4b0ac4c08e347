use async_trait::async_trait;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info};

use crate::config::{InvalidationConfig, SiteConfig};
use crate::error::ClientError;

/// Asks the rendering tier to regenerate the cached page at a path.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, path: &str) -> Result<(), ClientError>;
}

#[derive(Debug, Serialize)]
struct RevalidateRequest<'a> {
    path: &'a str,
}

pub struct RevalidationClient {
    client: reqwest::Client,
    endpoint: String,
    secret: Option<String>,
}

impl RevalidationClient {
    pub fn new(config: &InvalidationConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            secret: config.secret.clone(),
        })
    }
}

#[async_trait]
impl CacheInvalidator for RevalidationClient {
    async fn invalidate(&self, path: &str) -> Result<(), ClientError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&RevalidateRequest { path });
        if let Some(secret) = &self.secret {
            request = request.header("x-revalidate-secret", secret.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!(path, "Path revalidated");
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    pub invalidated: Vec<String>,
    pub failed: Vec<String>,
}

impl InvalidationReport {
    pub fn attempted(&self) -> usize {
        self.invalidated.len() + self.failed.len()
    }
}

/// Fans invalidation requests out over every locale variant of a page.
#[derive(Clone)]
pub struct InvalidationBroadcaster {
    invalidator: Arc<dyn CacheInvalidator>,
    site: SiteConfig,
}

impl InvalidationBroadcaster {
    pub fn new(invalidator: Arc<dyn CacheInvalidator>, site: SiteConfig) -> Self {
        Self { invalidator, site }
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    /// Invalidates each of `paths` in every locale. Failures are logged and
    /// collected; the remaining paths are still attempted.
    pub async fn invalidate_paths(&self, paths: &[String]) -> InvalidationReport {
        let mut report = InvalidationReport::default();

        for path in paths.iter().flat_map(|p| self.site.localized_paths(p)) {
            match self.invalidator.invalidate(&path).await {
                Ok(()) => report.invalidated.push(path),
                Err(e) => {
                    error!(path = %path, error = %e, "Invalidation failed");
                    report.failed.push(path);
                }
            }
        }

        report
    }

    pub async fn invalidate_match(&self, match_id: &str) -> InvalidationReport {
        let report = self
            .invalidate_paths(&[self.site.match_path(match_id)])
            .await;
        info!(
            match_id,
            invalidated = report.invalidated.len(),
            failed = report.failed.len(),
            "Invalidated match pages"
        );
        report
    }
}
