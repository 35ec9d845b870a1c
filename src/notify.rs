//! Notifier — renders inquiry payloads and delivers them to Slack.
//!
//! Delivery is at-least-once from the caller's perspective: failures
//! propagate so the ingestor can decide whether to retry the message.
//! The error side channel never propagates — reporting an error must not
//! crash the pipeline that is reporting it.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::classify::ClassifiedInquiry;
use crate::error::NotifyError;

const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

/// Hard cap on the body preview embedded in the notification.
const PREVIEW_MAX_CHARS: usize = 500;

/// Receipt returned by the channel on successful delivery.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub channel: Option<String>,
    pub ts: Option<String>,
}

/// Outbound notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one inquiry notification. Transient failures are returned,
    /// not retried internally.
    async fn post_inquiry(&self, inquiry: &ClassifiedInquiry)
    -> Result<DeliveryReceipt, NotifyError>;

    /// Report an operational error on the side channel. Never fails.
    async fn post_error(&self, error: &str, context: &str);
}

/// Slack implementation over `chat.postMessage`.
pub struct SlackNotifier {
    token: SecretString,
    channel: String,
    client: reqwest::Client,
}

#[derive(Debug, serde::Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

impl SlackNotifier {
    pub fn new(token: SecretString, channel: String, client: reqwest::Client) -> Self {
        Self {
            token,
            channel,
            client,
        }
    }

    async fn post_blocks(
        &self,
        fallback_text: &str,
        blocks: Vec<Value>,
    ) -> Result<DeliveryReceipt, NotifyError> {
        let body = json!({
            "channel": self.channel,
            "text": fallback_text,
            "blocks": blocks,
        });

        let resp = self
            .client
            .post(POST_MESSAGE_URL)
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Http {
                channel: self.channel.clone(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(NotifyError::Http {
                channel: self.channel.clone(),
                reason: format!("status {}", resp.status()),
            });
        }

        let parsed: PostMessageResponse =
            resp.json().await.map_err(|e| NotifyError::Http {
                channel: self.channel.clone(),
                reason: format!("invalid response: {e}"),
            })?;

        if !parsed.ok {
            return Err(NotifyError::Delivery {
                channel: self.channel.clone(),
                reason: parsed.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        Ok(DeliveryReceipt {
            channel: parsed.channel,
            ts: parsed.ts,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn post_inquiry(
        &self,
        inquiry: &ClassifiedInquiry,
    ) -> Result<DeliveryReceipt, NotifyError> {
        let fallback = format!("New catering inquiry from {}", inquiry.message.from);
        let receipt = self
            .post_blocks(&fallback, build_inquiry_blocks(inquiry))
            .await?;
        debug!(id = %inquiry.message.id, ts = ?receipt.ts, "Inquiry posted to Slack");
        Ok(receipt)
    }

    async fn post_error(&self, error: &str, context: &str) {
        let blocks = build_error_blocks(error, context);
        if let Err(e) = self.post_blocks("Mailbox relay error", blocks).await {
            warn!("Failed to post error notification: {e}");
        }
    }
}

// ── Payload rendering ───────────────────────────────────────────────

/// Build the Block Kit payload for one classified inquiry.
fn build_inquiry_blocks(inquiry: &ClassifiedInquiry) -> Vec<Value> {
    let msg = &inquiry.message;

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": "📧 New Catering Inquiry", "emoji": true }
        }),
        json!({
            "type": "section",
            "fields": [
                { "type": "mrkdwn", "text": format!("*From:*\n{}", msg.from) },
                { "type": "mrkdwn", "text": format!("*Subject:*\n{}", msg.subject) },
            ]
        }),
        json!({
            "type": "section",
            "fields": [
                { "type": "mrkdwn", "text": format!("*Received:*\n{}", msg.date) },
                { "type": "mrkdwn", "text": format!("*Email ID:*\n{}", msg.id) },
            ]
        }),
    ];

    // Extracted fields only when present.
    let mut extracted = Vec::new();
    if let Some(count) = inquiry.guest_count {
        extracted.push(json!({
            "type": "mrkdwn",
            "text": format!("*Guest Count:*\n{count} people")
        }));
    }
    if let Some(ref date) = inquiry.event_date {
        extracted.push(json!({
            "type": "mrkdwn",
            "text": format!("*Event Date:*\n{date}")
        }));
    }
    if !extracted.is_empty() {
        blocks.push(json!({ "type": "section", "fields": extracted }));
    }

    let preview = if !msg.body_text.is_empty() {
        msg.body_text.as_str()
    } else {
        msg.snippet.as_str()
    };
    blocks.push(json!({
        "type": "section",
        "text": {
            "type": "mrkdwn",
            "text": format!("*Preview:*\n```{}```", truncate_preview(preview))
        }
    }));

    blocks.push(json!({
        "type": "context",
        "elements": [
            { "type": "mrkdwn", "text": "Relayed from the monitored mailbox by inquiry-relay" }
        ]
    }));

    blocks.push(json!({
        "type": "actions",
        "elements": [
            {
                "type": "button",
                "text": { "type": "plain_text", "text": "📧 View in Gmail", "emoji": true },
                "url": format!("https://mail.google.com/mail/u/0/#inbox/{}", msg.id),
                "style": "primary"
            },
            {
                "type": "button",
                "text": { "type": "plain_text", "text": "Claim inquiry", "emoji": true },
                "value": msg.id,
                "action_id": "claim_inquiry"
            }
        ]
    }));

    blocks
}

/// Build the error side-channel payload.
fn build_error_blocks(error: &str, context: &str) -> Vec<Value> {
    vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": "⚠️ Mailbox Relay Error", "emoji": true }
        }),
        json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*Error:* {error}") }
        }),
        json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*Context:* {context}") }
        }),
        json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*Time:* {}", Utc::now().to_rfc3339()) }
        }),
    ]
}

/// Cap the preview at `PREVIEW_MAX_CHARS` characters, ellipsis-truncated.
fn truncate_preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_MAX_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(PREVIEW_MAX_CHARS - 3).collect();
    truncated.push_str("...");
    truncated
}
