//! OAuth2 service-account tokens for the indexing service.
//!
//! A signed JWT assertion is exchanged at the token endpoint for a
//! short-lived access token, which is cached until shortly before it expires.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::ServiceAccountConfig;
use crate::error::ClientError;

pub const INDEXING_SCOPE: &str = "https://www.googleapis.com/auth/indexing";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

struct CachedToken {
    value: String,
    refresh_after: DateTime<Utc>,
}

pub struct ServiceAccountTokenSource {
    client: reqwest::Client,
    client_email: String,
    token_uri: String,
    key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    pub fn new(client: reqwest::Client, account: &ServiceAccountConfig) -> Result<Self, ClientError> {
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| ClientError::Auth(format!("invalid service account key: {e}")))?;

        Ok(Self {
            client,
            client_email: account.client_email.clone(),
            token_uri: account.token_uri.clone(),
            key,
            cached: Mutex::new(None),
        })
    }

    /// Current access token, minting a new one when none is cached or the
    /// cached one is about to expire.
    pub async fn access_token(&self) -> Result<String, ClientError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref().filter(|t| t.refresh_after > now) {
            return Ok(token.value.clone());
        }

        let minted = self.exchange(now).await?;
        let value = minted.value.clone();
        *cached = Some(minted);
        Ok(value)
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String, ClientError> {
        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: INDEXING_SCOPE.to_string(),
            aud: self.token_uri.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| ClientError::Auth(format!("failed to sign assertion: {e}")))
    }

    async fn exchange(&self, now: DateTime<Utc>) -> Result<CachedToken, ClientError> {
        let assertion = self.assertion(now)?;
        let response = self
            .client
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Auth(format!(
                "token exchange failed (status {}): {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response.json().await?;
        debug!(expires_in = token.expires_in, "Minted indexing access token");
        info!(client_email = %self.client_email, "Refreshed indexing credentials");

        Ok(CachedToken {
            value: token.access_token,
            refresh_after: now + Duration::seconds(token.expires_in - EXPIRY_MARGIN_SECS),
        })
    }
}
