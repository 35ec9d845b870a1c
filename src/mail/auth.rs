//! Gmail OAuth2 — refresh-token flow with a cached access token.

use chrono::{DateTime, Duration, Utc};
use secrecy::ExposeSecret;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::GmailConfig;
use crate::error::MailboxError;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Safety margin subtracted from the reported token lifetime.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Holds the long-lived refresh token and exchanges it for short-lived
/// access tokens on demand. Safe to share between both ingestors.
pub struct GmailAuth {
    config: GmailConfig,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl GmailAuth {
    pub fn new(config: GmailConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            cached: Mutex::new(None),
        }
    }

    /// Return a valid access token, refreshing transparently when the cached
    /// one is missing or about to expire.
    pub async fn access_token(&self) -> Result<String, MailboxError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.access_token.clone());
            }
            debug!("Cached access token expired");
        }

        let fresh = self.request_token().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    /// Drop the cached token and fetch a new one. Used after the provider
    /// rejects a request with an auth-class status.
    pub async fn force_refresh(&self) -> Result<(), MailboxError> {
        let mut cached = self.cached.lock().await;
        let fresh = self.request_token().await?;
        *cached = Some(fresh);
        info!("Access token refreshed");
        Ok(())
    }

    async fn request_token(&self) -> Result<CachedToken, MailboxError> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("refresh_token", self.config.refresh_token.expose_secret()),
            ("grant_type", "refresh_token"),
        ];

        let resp = self
            .client
            .post(TOKEN_URL)
            .form(&form)
            .send()
            .await
            .map_err(|e| MailboxError::TokenRefresh(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(MailboxError::TokenRefresh(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| MailboxError::TokenRefresh(format!("invalid token response: {e}")))?;

        let lifetime = (token.expires_in - EXPIRY_MARGIN_SECS).max(0);
        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + Duration::seconds(lifetime),
        })
    }
}
