//! Message normalizer — raw provider payload → canonical `InboundMessage`.
//!
//! Pure transformation, no network. The only failure mode is a message with
//! no payload at all; callers skip and log those rather than abort a batch.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;
use tracing::debug;

use crate::error::ParseError;
use crate::mail::types::{MessagePart, RawMessage};

/// Canonical inbound email record.
///
/// Produced once per raw message and never mutated. Identity key is the
/// provider message id.
#[derive(Debug, Clone, Serialize)]
pub struct InboundMessage {
    pub id: String,
    pub thread_id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Raw Date header value, verbatim.
    pub date: String,
    pub body_text: String,
    pub body_html: String,
    pub snippet: String,
}

impl InboundMessage {
    /// Canonical body: plain text when present, else HTML, else empty.
    pub fn body(&self) -> &str {
        if !self.body_text.is_empty() {
            &self.body_text
        } else {
            &self.body_html
        }
    }
}

/// Convert a raw provider message into the canonical record.
pub fn normalize(raw: &RawMessage) -> Result<InboundMessage, ParseError> {
    let payload = raw.payload.as_ref().ok_or_else(|| ParseError::MalformedMessage {
        id: raw.id.clone(),
    })?;

    let headers = extract_headers(payload);
    let (body_text, body_html) = extract_body(payload);

    let header = |name: &str| headers.get(name).cloned().unwrap_or_default();

    Ok(InboundMessage {
        id: raw.id.clone(),
        thread_id: raw.thread_id.clone(),
        from: header("from"),
        to: header("to"),
        subject: header("subject"),
        date: header("date"),
        body_text,
        body_html,
        snippet: raw.snippet.clone(),
    })
}

/// Case-insensitive header map; the last occurrence of a duplicated header
/// wins.
fn extract_headers(payload: &MessagePart) -> HashMap<String, String> {
    payload
        .headers
        .iter()
        .map(|h| (h.name.to_lowercase(), h.value.clone()))
        .collect()
}

/// Walk the part tree depth-first and collect the first `text/plain` and
/// first `text/html` leaf found anywhere. Later parts of the same type never
/// override an already-found one. A non-multipart payload is its own leaf.
fn extract_body(payload: &MessagePart) -> (String, String) {
    let mut text: Option<String> = None;
    let mut html: Option<String> = None;

    // Explicit stack; children pushed in reverse so siblings are visited in
    // document order.
    let mut stack: Vec<&MessagePart> = vec![payload];
    while let Some(part) = stack.pop() {
        if let Some(children) = part.parts.as_ref().filter(|p| !p.is_empty()) {
            for child in children.iter().rev() {
                stack.push(child);
            }
            continue;
        }

        match part.mime_type.as_str() {
            "text/plain" if text.is_none() => text = Some(decode_part(part)),
            "text/html" if html.is_none() => html = Some(decode_part(part)),
            _ => {}
        }

        if text.is_some() && html.is_some() {
            break;
        }
    }

    (text.unwrap_or_default(), html.unwrap_or_default())
}

/// Decode a leaf part's URL-safe base64 data. Absent or undecodable data
/// yields an empty string.
fn decode_part(part: &MessagePart) -> String {
    let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) else {
        return String::new();
    };

    // The provider emits unpadded base64url; tolerate padded input too.
    match URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            debug!(mime_type = %part.mime_type, "Undecodable body data: {e}");
            String::new()
        }
    }
}
