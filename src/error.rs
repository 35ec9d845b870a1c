//! Error types for inquiry-relay.

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cursor store error: {0}")]
    Cursor(#[from] CursorError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Notify error: {0}")]
    Notify(#[from] NotifyError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Cursor store backend errors.
///
/// These never escape the store: reads fall back to defaults and writes are
/// logged and swallowed, so a broken backend degrades to re-scanning an
/// already-processed window rather than halting ingestion.
#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("Backend unavailable: {0}")]
    Backend(String),

    #[error("Query failed: {0}")]
    Query(String),
}

/// Mailbox provider errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Authentication rejected (status {status})")]
    Auth { status: u16 },

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Unexpected status {status} from {operation}: {body}")]
    UnexpectedStatus {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),
}

impl MailboxError {
    /// Whether this error should trigger the credential-refresh path.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

/// Errors from decoding provider payloads.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Message {id} has no payload")]
    MalformedMessage { id: String },

    #[error("Malformed webhook envelope: {0}")]
    MalformedWebhook(String),
}

/// Notification channel errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP failure posting to {channel}: {reason}")]
    Http { channel: String, reason: String },

    #[error("Delivery rejected by channel {channel}: {reason}")]
    Delivery { channel: String, reason: String },
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
