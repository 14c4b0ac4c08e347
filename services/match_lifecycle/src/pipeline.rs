use std::sync::Arc;

use crate::config::{PipelineConfig, ServerConfig};
use crate::error::ClientError;
use crate::invalidation::{CacheInvalidator, InvalidationBroadcaster, RevalidationClient};
use crate::kickoff::{HttpPageWarmer, KickoffPreSubmitter, PageWarmer};
use crate::monitor::MatchMonitor;
use crate::notifier::{IndexNotifier, IndexingApiClient, NotificationDispatcher};
use crate::poller::{ScoreSource, ScoreboardPoller};
use crate::server::AppState;
use crate::store::MatchStore;

/// External collaborators the pipeline talks to.
pub struct Collaborators {
    pub source: Arc<dyn ScoreSource>,
    pub notifier: Arc<dyn IndexNotifier>,
    pub invalidator: Arc<dyn CacheInvalidator>,
    pub warmer: Arc<dyn PageWarmer>,
}

impl Collaborators {
    /// HTTP-backed clients for every collaborator.
    pub fn http(config: &PipelineConfig) -> Result<Self, ClientError> {
        Ok(Self {
            source: Arc::new(ScoreboardPoller::new(&config.upstream)?),
            notifier: Arc::new(IndexingApiClient::new(&config.notification)?),
            invalidator: Arc::new(RevalidationClient::new(&config.invalidation)?),
            warmer: Arc::new(HttpPageWarmer::new(&config.kickoff)?),
        })
    }
}

/// Both entry points wired over one dispatcher, so the notification rate
/// ceiling holds across poll cycles, pre-submission and webhooks alike.
pub struct Pipeline {
    pub monitor: Arc<MatchMonitor>,
    pub presubmitter: Arc<KickoffPreSubmitter>,
    pub dispatcher: NotificationDispatcher,
    pub broadcaster: InvalidationBroadcaster,
    pub min_successful_locales: usize,
}

impl Pipeline {
    pub fn assemble(config: &PipelineConfig, store: Arc<dyn MatchStore>, parts: Collaborators) -> Self {
        let dispatcher =
            NotificationDispatcher::new(parts.notifier, &config.notification, config.site.clone());
        let broadcaster = InvalidationBroadcaster::new(parts.invalidator, config.site.clone());
        let min_successful_locales = config.notification.min_successful_locales;

        let monitor = MatchMonitor::new(
            parts.source,
            store.clone(),
            dispatcher.clone(),
            broadcaster.clone(),
            config.cycle.clone(),
            min_successful_locales,
        );
        let presubmitter = KickoffPreSubmitter::new(
            store,
            parts.warmer,
            dispatcher.clone(),
            config.site.clone(),
            config.kickoff.clone(),
            config.cycle.deadline(),
            min_successful_locales,
        );

        Self {
            monitor: Arc::new(monitor),
            presubmitter: Arc::new(presubmitter),
            dispatcher,
            broadcaster,
            min_successful_locales,
        }
    }

    pub fn app_state(&self, server: &ServerConfig) -> AppState {
        AppState {
            monitor: self.monitor.clone(),
            presubmitter: self.presubmitter.clone(),
            dispatcher: self.dispatcher.clone(),
            broadcaster: self.broadcaster.clone(),
            min_successful_locales: self.min_successful_locales,
            webhook_secret: server.webhook_secret.clone(),
            cron_secret: server.cron_secret.clone(),
        }
    }
}
