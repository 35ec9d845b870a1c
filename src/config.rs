//! Configuration, built from environment variables.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Gmail OAuth + mailbox settings.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub refresh_token: SecretString,
    /// Address the monitored mailbox receives on (used in the unread query).
    pub user_email: String,
}

/// Slack delivery settings.
#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub token: SecretString,
    pub channel: String,
}

/// Top-level relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub gmail: GmailConfig,
    pub slack: SlackConfig,
    /// Seconds between scheduled poll runs.
    pub poll_interval_secs: u64,
    /// Maximum unread messages listed per poll run.
    pub max_batch: u32,
    /// Path for the durable cursor database. `None` → in-memory cursors.
    pub db_path: Option<String>,
    /// Port the webhook server binds on.
    pub port: u16,
}

fn required(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

impl RelayConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let gmail = GmailConfig {
            client_id: required("GMAIL_CLIENT_ID")?,
            client_secret: SecretString::from(required("GMAIL_CLIENT_SECRET")?),
            refresh_token: SecretString::from(required("GMAIL_REFRESH_TOKEN")?),
            user_email: required("GMAIL_USER_EMAIL")?,
        };

        let slack = SlackConfig {
            token: SecretString::from(required("SLACK_TOKEN")?),
            channel: std::env::var("SLACK_CHANNEL").unwrap_or_else(|_| "gmail-inbox".to_string()),
        };

        let poll_interval_secs: u64 = std::env::var("RELAY_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(300);

        let max_batch: u32 = std::env::var("RELAY_MAX_BATCH")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let db_path = std::env::var("RELAY_DB_PATH").ok().filter(|s| !s.is_empty());

        let port: u16 = std::env::var("RELAY_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        Ok(Self {
            gmail,
            slack,
            poll_interval_secs,
            max_batch,
            db_path,
            port,
        })
    }
}
