use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{ServerConfig, SiteConfig};
use crate::error::ApiError;
use crate::invalidation::InvalidationBroadcaster;
use crate::kickoff::{KickoffPreSubmitter, KickoffReport};
use crate::monitor::{CycleReport, MatchMonitor};
use crate::notifier::NotificationDispatcher;

const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Kind of published content announced on the content webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Commentary,
    Report,
    Prediction,
    TrendingPlayers,
    Unknown,
}

impl ContentType {
    pub fn parse(value: &str) -> Self {
        match value {
            "commentary" => ContentType::Commentary,
            "report" => ContentType::Report,
            "prediction" => ContentType::Prediction,
            "trending_players" => ContentType::TrendingPlayers,
            _ => ContentType::Unknown,
        }
    }
}

/// Unlocalized paths to regenerate for a content event.
pub fn content_paths(content_type: ContentType, match_id: Option<&str>, site: &SiteConfig) -> Vec<String> {
    let mut paths = vec![site.listing_path()];

    if matches!(content_type, ContentType::Report | ContentType::TrendingPlayers) {
        paths.push("/".to_string());
    }

    if let Some(match_id) = match_id {
        match content_type {
            ContentType::Commentary | ContentType::Report => {
                paths.push(site.match_path(match_id));
            }
            ContentType::Prediction => {
                paths.push(site.match_path(match_id));
                paths.push(site.prediction_path(match_id));
            }
            ContentType::TrendingPlayers | ContentType::Unknown => {}
        }
    }

    paths
}

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<MatchMonitor>,
    pub presubmitter: Arc<KickoffPreSubmitter>,
    pub dispatcher: NotificationDispatcher,
    pub broadcaster: InvalidationBroadcaster,
    pub min_successful_locales: usize,
    pub webhook_secret: Option<String>,
    pub cron_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentEvent {
    #[serde(rename = "type", default)]
    content_type: Option<String>,
    #[serde(default)]
    match_id: Option<Value>,
    #[serde(default)]
    locale: Option<String>,
    #[serde(default)]
    action: Option<String>,
}

#[derive(Debug, Serialize)]
struct ContentWebhookResponse {
    success: bool,
    #[serde(rename = "type")]
    content_type: String,
    paths: Vec<String>,
    failed: Vec<String>,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct MatchStatusEvent {
    #[serde(default)]
    match_id: Option<Value>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Serialize)]
struct MatchStatusResponse {
    success: bool,
    match_id: String,
    status: String,
    indexing_notified: bool,
    paths: Vec<String>,
    timestamp: DateTime<Utc>,
}

/// Match ids arrive either as strings or as bare numbers.
fn match_id_of(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn check_webhook_secret(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = state
        .webhook_secret
        .as_deref()
        .ok_or(ApiError::NotConfigured("webhook secret"))?;
    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());

    if provided != Some(expected) {
        warn!("Rejected webhook call with invalid secret");
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

fn check_cron_secret(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(secret) = state.cron_secret.as_deref() else {
        return Ok(());
    };
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if provided != Some(secret) {
        warn!("Rejected cron call with invalid token");
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}

async fn content_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ContentWebhookResponse>, ApiError> {
    check_webhook_secret(&state, &headers)?;

    let event: ContentEvent = parse_body(&body)?;
    let Some(kind) = event.content_type.filter(|t| !t.trim().is_empty()) else {
        return Err(ApiError::BadRequest("Missing required field: type".to_string()));
    };

    let content_type = ContentType::parse(&kind);
    if content_type == ContentType::Unknown {
        warn!(content_type = %kind, "Unknown content type, invalidating listing only");
    }

    let match_id = match_id_of(event.match_id);
    let site = state.broadcaster.site();
    let paths = content_paths(content_type, match_id.as_deref(), site);

    let report = state.broadcaster.invalidate_paths(&paths).await;
    info!(
        content_type = %kind,
        match_id = ?match_id,
        locale = ?event.locale,
        action = ?event.action,
        invalidated = report.invalidated.len(),
        failed = report.failed.len(),
        "Content webhook processed"
    );

    Ok(Json(ContentWebhookResponse {
        success: true,
        content_type: kind,
        paths: report.invalidated,
        failed: report.failed,
        timestamp: Utc::now(),
    }))
}

async fn content_webhook_usage() -> impl IntoResponse {
    Json(serde_json::json!({
        "endpoint": "/api/webhooks/content",
        "method": "POST",
        "headers": { "x-webhook-secret": "<shared secret>" },
        "body": {
            "type": "commentary | report | prediction | trending_players",
            "match_id": "optional",
            "locale": "optional",
            "action": "optional"
        }
    }))
}

async fn match_status_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MatchStatusResponse>, ApiError> {
    check_webhook_secret(&state, &headers)?;

    let event: MatchStatusEvent = parse_body(&body)?;
    let (Some(match_id), Some(status)) = (
        match_id_of(event.match_id),
        event.status.filter(|s| !s.trim().is_empty()),
    ) else {
        return Err(ApiError::BadRequest(
            "Missing required fields: match_id, status".to_string(),
        ));
    };

    info!(match_id = %match_id, status = %status, "Match status webhook received");
    let outcome = state.dispatcher.notify_match(&match_id).await;
    let report = state.broadcaster.invalidate_match(&match_id).await;

    Ok(Json(MatchStatusResponse {
        success: true,
        match_id,
        status,
        indexing_notified: outcome.reached(state.min_successful_locales),
        paths: report.invalidated,
        timestamp: Utc::now(),
    }))
}

async fn monitor_matches(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CycleReport>, ApiError> {
    check_cron_secret(&state, &headers)?;
    Ok(Json(state.monitor.run_cycle().await?))
}

async fn preindex_matches(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<KickoffReport>, ApiError> {
    check_cron_secret(&state, &headers)?;
    Ok(Json(state.presubmitter.run().await?))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/webhooks/content",
            post(content_webhook).get(content_webhook_usage),
        )
        .route("/api/webhooks/match-status", post(match_status_webhook))
        .route("/api/cron/monitor-matches", get(monitor_matches))
        .route("/api/cron/preindex-matches", get(preindex_matches))
        .with_state(state)
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

pub async fn serve(config: &ServerConfig, state: AppState) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Match lifecycle server listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}
