//! Mailbox provider client — Gmail REST API behind the `Mailbox` trait.

use async_trait::async_trait;
use tracing::debug;

use crate::error::MailboxError;
use crate::mail::auth::GmailAuth;
use crate::mail::types::{HistoryEntry, HistoryList, MessageList, RawMessage};

const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Mailbox provider operations both ingestors need.
///
/// Pure I/O seam — normalization, classification, and watermark logic live
/// in the callers. Implemented by `GmailClient` in production and by fakes
/// in tests.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// List ids of unread messages received after `after_epoch`, newest
    /// first, at most `max_results`.
    async fn list_unread(
        &self,
        after_epoch: i64,
        max_results: u32,
    ) -> Result<Vec<String>, MailboxError>;

    /// Fetch a full message, including the MIME part tree.
    async fn get_message(&self, id: &str) -> Result<RawMessage, MailboxError>;

    /// Remove the UNREAD label so the message drops out of later unread
    /// queries regardless of the timestamp watermark.
    async fn mark_read(&self, id: &str) -> Result<(), MailboxError>;

    /// Fetch change-log entries from `start_history_id` forward, restricted
    /// to message-added changes.
    async fn list_history(&self, start_history_id: u64)
    -> Result<Vec<HistoryEntry>, MailboxError>;

    /// Token-refresh collaborator hook, invoked after an auth-class failure.
    async fn refresh_credentials(&self) -> Result<(), MailboxError>;
}

/// Gmail REST implementation.
pub struct GmailClient {
    auth: GmailAuth,
    client: reqwest::Client,
    user_email: String,
}

impl GmailClient {
    pub fn new(auth: GmailAuth, client: reqwest::Client, user_email: String) -> Self {
        Self {
            auth,
            client,
            user_email,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, MailboxError> {
        let token = self.auth.access_token().await?;
        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| MailboxError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(operation, status, resp).await);
        }

        resp.json().await.map_err(|e| MailboxError::InvalidResponse {
            operation: operation.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Map a non-success provider response to the error taxonomy.
async fn status_error(
    operation: &str,
    status: reqwest::StatusCode,
    resp: reqwest::Response,
) -> MailboxError {
    match status.as_u16() {
        401 | 403 => MailboxError::Auth {
            status: status.as_u16(),
        },
        429 => MailboxError::RateLimited,
        code => MailboxError::UnexpectedStatus {
            operation: operation.to_string(),
            status: code,
            body: resp.text().await.unwrap_or_default(),
        },
    }
}

#[async_trait]
impl Mailbox for GmailClient {
    async fn list_unread(
        &self,
        after_epoch: i64,
        max_results: u32,
    ) -> Result<Vec<String>, MailboxError> {
        let query = format!("is:unread after:{after_epoch} to:{}", self.user_email);
        let list: MessageList = self
            .get_json(
                "list_unread",
                &format!("{API_BASE}/messages"),
                &[("q", query), ("maxResults", max_results.to_string())],
            )
            .await?;

        debug!(count = list.messages.len(), "Listed unread messages");
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    async fn get_message(&self, id: &str) -> Result<RawMessage, MailboxError> {
        self.get_json(
            "get_message",
            &format!("{API_BASE}/messages/{id}"),
            &[("format", "full".to_string())],
        )
        .await
    }

    async fn mark_read(&self, id: &str) -> Result<(), MailboxError> {
        let token = self.auth.access_token().await?;
        let resp = self
            .client
            .post(format!("{API_BASE}/messages/{id}/modify"))
            .bearer_auth(token)
            .json(&serde_json::json!({ "removeLabelIds": ["UNREAD"] }))
            .send()
            .await
            .map_err(|e| MailboxError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error("mark_read", status, resp).await);
        }

        debug!(id, "Marked message read");
        Ok(())
    }

    async fn list_history(
        &self,
        start_history_id: u64,
    ) -> Result<Vec<HistoryEntry>, MailboxError> {
        let list: HistoryList = self
            .get_json(
                "list_history",
                &format!("{API_BASE}/history"),
                &[
                    ("startHistoryId", start_history_id.to_string()),
                    ("historyTypes", "messageAdded".to_string()),
                ],
            )
            .await?;

        debug!(count = list.history.len(), "Listed history entries");
        Ok(list.history)
    }

    async fn refresh_credentials(&self) -> Result<(), MailboxError> {
        self.auth.force_refresh().await
    }
}
