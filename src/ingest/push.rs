//! Push ingestor — webhook-triggered diff against the mailbox change log.
//!
//! The provider posts a base64 envelope carrying the triggering history
//! token. The ingestor diffs the change log from the stored watermark (or
//! `trigger - 1` on the very first delivery, so the triggering change itself
//! is captured), relays newly-added messages, and advances the history
//! watermark. No read-marking happens on this path — the webhook is
//! edge-triggered. Run-level failures surface as 500 and rely on the
//! caller's redelivery for retry.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::classify::Classifier;
use crate::cursor::CursorStore;
use crate::error::{ParseError, Result};
use crate::ingest::relay_one;
use crate::mail::Mailbox;
use crate::notify::Notifier;

/// Report of one webhook run.
#[derive(Debug, Clone, Default)]
pub struct PushOutcome {
    pub entries: usize,
    pub processed: usize,
    pub notified: usize,
    pub failed: usize,
}

/// Webhook-triggered ingestor over the mailbox change log.
pub struct PushIngestor {
    mailbox: Arc<dyn Mailbox>,
    cursor: Arc<dyn CursorStore>,
    notifier: Arc<dyn Notifier>,
    classifier: Classifier,
}

impl PushIngestor {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        cursor: Arc<dyn CursorStore>,
        notifier: Arc<dyn Notifier>,
        classifier: Classifier,
    ) -> Self {
        Self {
            mailbox,
            cursor,
            notifier,
            classifier,
        }
    }

    /// Process one decoded push notification.
    pub async fn handle_notification(&self, trigger_id: u64) -> Result<PushOutcome> {
        let start = match self.cursor.last_history_id().await {
            Some(id) => id,
            // First-ever delivery: seed one before the trigger so the
            // triggering change itself is included.
            None => trigger_id.saturating_sub(1),
        };

        let entries = self.mailbox.list_history(start).await?;

        let mut outcome = PushOutcome {
            entries: entries.len(),
            ..Default::default()
        };

        for entry in &entries {
            for added in &entry.messages_added {
                let id = &added.message.id;
                outcome.processed += 1;
                match relay_one(
                    self.mailbox.as_ref(),
                    &self.classifier,
                    self.notifier.as_ref(),
                    id,
                )
                .await
                {
                    Ok(true) => outcome.notified += 1,
                    Ok(false) => {}
                    Err(e) => {
                        error!(id = %id, "Failed to process added message: {e}");
                        outcome.failed += 1;
                    }
                }
            }
        }

        self.cursor.set_last_history_id(trigger_id).await;

        info!(
            trigger_id,
            start,
            entries = outcome.entries,
            notified = outcome.notified,
            failed = outcome.failed,
            "Push notification processed"
        );

        Ok(outcome)
    }
}

/// Decode the webhook envelope down to the triggering history token.
///
/// Expected shape: `{"message": {"data": "<base64 of {\"historyId\": N}>"}}`.
pub fn decode_envelope(body: &Value) -> std::result::Result<u64, ParseError> {
    let data = body
        .get("message")
        .and_then(|m| m.get("data"))
        .and_then(|d| d.as_str())
        .ok_or_else(|| ParseError::MalformedWebhook("missing message.data".into()))?;

    let bytes = STANDARD
        .decode(data)
        .map_err(|e| ParseError::MalformedWebhook(format!("undecodable data: {e}")))?;

    let inner: Value = serde_json::from_slice(&bytes)
        .map_err(|e| ParseError::MalformedWebhook(format!("data is not JSON: {e}")))?;

    inner
        .get("historyId")
        .and_then(|v| {
            v.as_u64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        })
        .ok_or_else(|| ParseError::MalformedWebhook("missing historyId".into()))
}

// ── HTTP surface ────────────────────────────────────────────────────

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub push: Arc<PushIngestor>,
}

/// Build the Axum router for the webhook server.
pub fn webhook_routes(push: Arc<PushIngestor>) -> Router {
    Router::new()
        .route("/gmail/webhook", post(gmail_webhook))
        .route("/health", get(health))
        .with_state(AppState { push })
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "inquiry-relay"
    }))
}

async fn gmail_webhook(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, &'static str) {
    let trigger_id = match decode_envelope(&body) {
        Ok(id) => id,
        Err(e) => {
            warn!("Rejecting webhook: {e}");
            return (StatusCode::BAD_REQUEST, "Invalid webhook payload");
        }
    };

    match state.push.handle_notification(trigger_id).await {
        Ok(outcome) if outcome.processed == 0 => (StatusCode::OK, "No new messages"),
        Ok(_) => (StatusCode::OK, "Webhook processed"),
        Err(e) => {
            error!("Webhook processing failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::result::Result;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    use super::*;
    use crate::classify::ClassifiedInquiry;
    use crate::cursor::MemoryCursorStore;
    use crate::error::{MailboxError, NotifyError};
    use crate::mail::types::{
        AddedMessage, Header, HistoryEntry, MessagePart, MessageRef, PartBody, RawMessage,
    };
    use crate::notify::DeliveryReceipt;

    fn make_raw(id: &str, subject: &str, body: &str) -> RawMessage {
        RawMessage {
            id: id.into(),
            thread_id: format!("thread-{id}"),
            snippet: String::new(),
            payload: Some(MessagePart {
                mime_type: "text/plain".into(),
                headers: vec![
                    Header {
                        name: "From".into(),
                        value: "guest@example.com".into(),
                    },
                    Header {
                        name: "Subject".into(),
                        value: subject.into(),
                    },
                ],
                body: Some(PartBody {
                    data: Some(URL_SAFE_NO_PAD.encode(body)),
                }),
                parts: None,
            }),
        }
    }

    fn added_entry(ids: &[&str]) -> HistoryEntry {
        HistoryEntry {
            messages_added: ids
                .iter()
                .map(|id| AddedMessage {
                    message: MessageRef {
                        id: (*id).to_string(),
                    },
                })
                .collect(),
        }
    }

    #[derive(Default)]
    struct FakeMailbox {
        messages: Mutex<HashMap<String, RawMessage>>,
        history: Mutex<Vec<HistoryEntry>>,
        history_queries: Mutex<Vec<u64>>,
        history_error: Mutex<Option<MailboxError>>,
    }

    #[async_trait]
    impl Mailbox for FakeMailbox {
        async fn list_unread(
            &self,
            _after_epoch: i64,
            _max_results: u32,
        ) -> Result<Vec<String>, MailboxError> {
            Ok(Vec::new())
        }

        async fn get_message(&self, id: &str) -> Result<RawMessage, MailboxError> {
            self.messages
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| MailboxError::InvalidResponse {
                    operation: "get_message".into(),
                    reason: format!("unknown id {id}"),
                })
        }

        async fn mark_read(&self, _id: &str) -> Result<(), MailboxError> {
            panic!("push path must not mark messages read");
        }

        async fn list_history(
            &self,
            start_history_id: u64,
        ) -> Result<Vec<HistoryEntry>, MailboxError> {
            if let Some(e) = self.history_error.lock().unwrap().take() {
                return Err(e);
            }
            self.history_queries.lock().unwrap().push(start_history_id);
            Ok(self.history.lock().unwrap().clone())
        }

        async fn refresh_credentials(&self) -> Result<(), MailboxError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        posted: Mutex<Vec<ClassifiedInquiry>>,
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn post_inquiry(
            &self,
            inquiry: &ClassifiedInquiry,
        ) -> Result<DeliveryReceipt, NotifyError> {
            self.posted.lock().unwrap().push(inquiry.clone());
            Ok(DeliveryReceipt {
                channel: Some("C123".into()),
                ts: Some("1.2".into()),
            })
        }

        async fn post_error(&self, _error: &str, _context: &str) {}
    }

    fn make_ingestor(
        mailbox: Arc<FakeMailbox>,
        notifier: Arc<FakeNotifier>,
    ) -> (PushIngestor, Arc<MemoryCursorStore>) {
        let cursor = Arc::new(MemoryCursorStore::new());
        let ingestor = PushIngestor::new(
            mailbox,
            Arc::clone(&cursor) as Arc<dyn CursorStore>,
            notifier,
            Classifier::new(),
        );
        (ingestor, cursor)
    }

    fn envelope(history_id: u64) -> Value {
        let inner = serde_json::json!({ "historyId": history_id, "emailAddress": "me@example.com" });
        serde_json::json!({
            "message": { "data": STANDARD.encode(inner.to_string()) }
        })
    }

    #[test]
    fn decodes_valid_envelope() {
        assert_eq!(decode_envelope(&envelope(12345)).unwrap(), 12345);
    }

    #[test]
    fn decodes_string_history_id() {
        let inner = serde_json::json!({ "historyId": "678" });
        let body = serde_json::json!({
            "message": { "data": STANDARD.encode(inner.to_string()) }
        });
        assert_eq!(decode_envelope(&body).unwrap(), 678);
    }

    #[test]
    fn rejects_envelope_without_data() {
        let body = serde_json::json!({ "message": {} });
        assert!(matches!(
            decode_envelope(&body),
            Err(ParseError::MalformedWebhook(_))
        ));
    }

    #[test]
    fn rejects_non_base64_data() {
        let body = serde_json::json!({ "message": { "data": "!!! not base64 !!!" } });
        assert!(decode_envelope(&body).is_err());
    }

    #[tokio::test]
    async fn first_delivery_queries_from_trigger_minus_one() {
        let mailbox = Arc::new(FakeMailbox::default());
        let notifier = Arc::new(FakeNotifier::default());
        let (ingestor, cursor) = make_ingestor(Arc::clone(&mailbox), notifier);

        ingestor.handle_notification(1000).await.unwrap();

        assert_eq!(*mailbox.history_queries.lock().unwrap(), vec![999]);
        assert_eq!(cursor.last_history_id().await, Some(1000));
    }

    #[tokio::test]
    async fn later_deliveries_query_from_stored_watermark() {
        let mailbox = Arc::new(FakeMailbox::default());
        let notifier = Arc::new(FakeNotifier::default());
        let (ingestor, cursor) = make_ingestor(Arc::clone(&mailbox), notifier);

        cursor.set_last_history_id(500).await;
        ingestor.handle_notification(600).await.unwrap();

        assert_eq!(*mailbox.history_queries.lock().unwrap(), vec![500]);
        assert_eq!(cursor.last_history_id().await, Some(600));
    }

    #[tokio::test]
    async fn added_messages_are_relayed_without_read_marking() {
        let mailbox = Arc::new(FakeMailbox::default());
        mailbox.messages.lock().unwrap().insert(
            "m1".into(),
            make_raw("m1", "Catering für 25 Gäste", "am 01.08.2025 bitte"),
        );
        *mailbox.history.lock().unwrap() = vec![added_entry(&["m1"]), HistoryEntry::default()];
        let notifier = Arc::new(FakeNotifier::default());
        let (ingestor, _) = make_ingestor(Arc::clone(&mailbox), Arc::clone(&notifier));

        let outcome = ingestor.handle_notification(2000).await.unwrap();

        assert_eq!(outcome.entries, 2);
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.notified, 1);
        let posted = notifier.posted.lock().unwrap();
        assert_eq!(posted[0].guest_count, Some(25));
        assert_eq!(posted[0].event_date.as_deref(), Some("01.08.2025"));
    }

    #[tokio::test]
    async fn per_message_failures_do_not_block_batch_or_watermark() {
        let mailbox = Arc::new(FakeMailbox::default());
        mailbox
            .messages
            .lock()
            .unwrap()
            .insert("good".into(), make_raw("good", "Event buffet", "for 12 people"));
        // "missing" has no stored message, so get_message fails for it.
        *mailbox.history.lock().unwrap() = vec![added_entry(&["missing", "good"])];
        let notifier = Arc::new(FakeNotifier::default());
        let (ingestor, cursor) = make_ingestor(Arc::clone(&mailbox), Arc::clone(&notifier));

        let outcome = ingestor.handle_notification(3000).await.unwrap();

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.notified, 1);
        assert_eq!(cursor.last_history_id().await, Some(3000));
    }

    #[tokio::test]
    async fn history_failure_aborts_without_advancing() {
        let mailbox = Arc::new(FakeMailbox::default());
        *mailbox.history_error.lock().unwrap() =
            Some(MailboxError::Transport("timeout".into()));
        let notifier = Arc::new(FakeNotifier::default());
        let (ingestor, cursor) = make_ingestor(Arc::clone(&mailbox), notifier);

        cursor.set_last_history_id(500).await;
        let result = ingestor.handle_notification(600).await;

        assert!(result.is_err());
        assert_eq!(cursor.last_history_id().await, Some(500));
    }
}
