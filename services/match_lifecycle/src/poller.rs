//! Live-score poller for an ESPN-style scoreboard feed.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::UpstreamConfig;
use crate::error::ClientError;
use crate::types::{MatchStatus, PolledMatch};

const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Source of the current full match slate.
#[async_trait]
pub trait ScoreSource: Send + Sync {
    async fn fetch_slate(&self) -> Result<Vec<PolledMatch>, ClientError>;
}

#[derive(Debug, Deserialize)]
struct Scoreboard {
    #[serde(default)]
    events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct Event {
    id: String,
    #[serde(default)]
    status: Option<EventStatus>,
    #[serde(default)]
    competitions: Vec<Competition>,
}

#[derive(Debug, Deserialize)]
struct EventStatus {
    #[serde(rename = "type", default)]
    status_type: Option<StatusType>,
}

#[derive(Debug, Deserialize)]
struct StatusType {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    completed: bool,
}

#[derive(Debug, Deserialize)]
struct Competition {
    #[serde(default)]
    competitors: Vec<Competitor>,
}

#[derive(Debug, Deserialize)]
struct Competitor {
    #[serde(rename = "homeAway", default)]
    home_away: Option<String>,
    #[serde(default)]
    score: Option<String>,
    #[serde(default)]
    team: Option<Team>,
}

#[derive(Debug, Deserialize)]
struct Team {
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
}

fn status_of(event: &Event) -> MatchStatus {
    match event.status.as_ref().and_then(|s| s.status_type.as_ref()) {
        Some(t) if t.completed => MatchStatus::Completed,
        Some(t) if t.state.as_deref() == Some("in") => MatchStatus::Live,
        _ => MatchStatus::Scheduled,
    }
}

fn parse_score(score: Option<&str>) -> u32 {
    score.and_then(|s| s.trim().parse().ok()).unwrap_or(0)
}

/// Picks home/away by `homeAway`, falling back to listing order.
fn sides(competitors: &[Competitor]) -> (Option<&Competitor>, Option<&Competitor>) {
    let tagged = |side: &str| {
        competitors
            .iter()
            .find(|c| c.home_away.as_deref() == Some(side))
    };
    match (tagged("home"), tagged("away")) {
        (Some(home), Some(away)) => (Some(home), Some(away)),
        _ => (competitors.first(), competitors.get(1)),
    }
}

fn to_polled(event: Event) -> PolledMatch {
    let status = status_of(&event);
    let competitors = event
        .competitions
        .first()
        .map(|c| c.competitors.as_slice())
        .unwrap_or_default();
    let (home, away) = sides(competitors);
    let name = |c: Option<&Competitor>| {
        c.and_then(|c| c.team.as_ref())
            .and_then(|t| t.display_name.clone())
    };
    let score = |c: Option<&Competitor>| parse_score(c.and_then(|c| c.score.as_deref()));

    PolledMatch {
        match_id: event.id,
        status,
        home_team: name(home),
        away_team: name(away),
        home_score: score(home),
        away_score: score(away),
    }
}

/// Parses a scoreboard payload into the polled slate.
pub fn parse_scoreboard(body: &str) -> Result<Vec<PolledMatch>, ClientError> {
    let scoreboard: Scoreboard =
        serde_json::from_str(body).map_err(|e| ClientError::Decode(e.to_string()))?;
    Ok(scoreboard.events.into_iter().map(to_polled).collect())
}

pub struct ScoreboardPoller {
    client: reqwest::Client,
    url: String,
    max_retries: u32,
}

impl ScoreboardPoller {
    pub fn new(config: &UpstreamConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.scoreboard_url.clone(),
            max_retries: config.max_retries.max(1),
        })
    }

    async fn fetch_once(&self) -> Result<Vec<PolledMatch>, ClientError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        debug!(bytes = body.len(), "Got scoreboard response");
        parse_scoreboard(&body)
    }
}

#[async_trait]
impl ScoreSource for ScoreboardPoller {
    async fn fetch_slate(&self) -> Result<Vec<PolledMatch>, ClientError> {
        let mut delay = INITIAL_RETRY_DELAY;
        let mut attempt = 1;

        loop {
            match self.fetch_once().await {
                Ok(slate) => {
                    info!(matches = slate.len(), "Fetched scoreboard slate");
                    return Ok(slate);
                }
                // A payload that does not parse will not parse on retry either.
                Err(e @ ClientError::Decode(_)) => return Err(e),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(e);
                    }
                    warn!(attempt, error = %e, "Scoreboard fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
            }
        }
    }
}
