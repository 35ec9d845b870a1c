//! Wire types for the Gmail REST API subset the relay consumes.
//!
//! Only the fields the pipeline reads are modeled; everything else in the
//! provider responses is ignored by serde.

use serde::Deserialize;

/// A full message as returned by `users.messages.get`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub snippet: String,
    /// Root of the MIME part tree. Absent payloads are malformed.
    pub payload: Option<MessagePart>,
}

/// One node of the MIME part tree: a leaf with body data, or a container
/// with child parts (multipart messages have both in practice).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    pub body: Option<PartBody>,
    pub parts: Option<Vec<MessagePart>>,
}

/// Body of a leaf part. `data` is URL-safe base64.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartBody {
    pub data: Option<String>,
}

/// A single RFC 822 header.
#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Response of `users.messages.list`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
}

/// A message reference from a list or history response.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

/// Response of `users.history.list`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryList {
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// One change-log record. Only `messagesAdded` entries matter to the relay;
/// label changes and deletions arrive as entries with an empty list here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(default)]
    pub messages_added: Vec<AddedMessage>,
}

/// Wrapper around the message reference in a `messagesAdded` record.
#[derive(Debug, Clone, Deserialize)]
pub struct AddedMessage {
    pub message: MessageRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_nested_message() {
        let raw: RawMessage = serde_json::from_value(serde_json::json!({
            "id": "m1",
            "threadId": "t1",
            "snippet": "hello",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [{"name": "Subject", "value": "Hi"}],
                "parts": [
                    {"mimeType": "text/plain", "body": {"data": "aGk"}},
                    {"mimeType": "text/html", "body": {}}
                ]
            }
        }))
        .unwrap();

        let payload = raw.payload.unwrap();
        assert_eq!(payload.mime_type, "multipart/alternative");
        assert_eq!(payload.parts.as_ref().unwrap().len(), 2);
        assert_eq!(payload.headers[0].name, "Subject");
    }

    #[test]
    fn deserializes_history_with_mixed_entries() {
        let list: HistoryList = serde_json::from_value(serde_json::json!({
            "history": [
                {"messagesAdded": [{"message": {"id": "m1"}}]},
                {"labelsRemoved": [{"message": {"id": "m2"}}]}
            ]
        }))
        .unwrap();

        assert_eq!(list.history.len(), 2);
        assert_eq!(list.history[0].messages_added.len(), 1);
        assert!(list.history[1].messages_added.is_empty());
    }

    #[test]
    fn empty_list_response() {
        let list: MessageList = serde_json::from_value(serde_json::json!({
            "resultSizeEstimate": 0
        }))
        .unwrap();
        assert!(list.messages.is_empty());
    }
}
