//! Inquiry classifier — keyword relevance plus field extraction.
//!
//! Recall-favoring by design: a false positive costs one extra Slack post,
//! a false negative loses a customer inquiry. Pure and deterministic.

use regex::Regex;
use tracing::debug;

use crate::normalize::InboundMessage;

/// Business-inquiry keyword set (English/German). Matched case-insensitively
/// as substrings of `subject + " " + body`.
const INQUIRY_KEYWORDS: &[&str] = &[
    "catering",
    "veranstaltung",
    "event",
    "feier",
    "party",
    "hochzeit",
    "wedding",
    "geburtstag",
    "birthday",
    "firmenevent",
    "business",
    "lunch",
    "buffet",
    "menü",
    "menu",
    "gäste",
    "guests",
    "personen",
    "people",
    "angebot",
    "offer",
    "anfrage",
    "inquiry",
];

/// A classified message: the canonical record plus the relevance decision
/// and extracted fields. Derived fresh on every call, never persisted.
#[derive(Debug, Clone)]
pub struct ClassifiedInquiry {
    pub message: InboundMessage,
    pub is_relevant: bool,
    /// Extracted guest count; absent (not zero) when no pattern matched.
    pub guest_count: Option<u32>,
    /// First date-shaped substring, verbatim — no calendar validation.
    pub event_date: Option<String>,
}

/// Classifier with all patterns compiled once at construction.
pub struct Classifier {
    guest_patterns: Vec<Regex>,
    date_patterns: Vec<Regex>,
}

impl Classifier {
    /// Compile the fixed extraction pattern tables.
    ///
    /// The pattern literals are static and known-valid; a failure here is a
    /// programming error, so construction is infallible.
    pub fn new() -> Self {
        let guest_patterns = [
            r"(?i)(\d+)\s*(?:personen|people|gäste|guests)",
            r"(?i)(?:für|for)\s*(\d+)\s*(?:personen|people|gäste|guests)?",
            r"(?i)(\d+)\s*(?:teilnehmer|attendees|participants)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("guest pattern must compile"))
        .collect();

        // Day-first, then month-first, then ISO — fixed priority order.
        let date_patterns = [
            r"\d{1,2}\.\s*\d{1,2}\.\s*\d{4}",
            r"\d{1,2}/\d{1,2}/\d{4}",
            r"\d{4}-\d{2}-\d{2}",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("date pattern must compile"))
        .collect();

        Self {
            guest_patterns,
            date_patterns,
        }
    }

    /// Classify a normalized message. Same input always yields the same
    /// output; extraction only runs for relevant messages.
    pub fn classify(&self, message: InboundMessage) -> ClassifiedInquiry {
        let content = format!("{} {}", message.subject, message.body());
        let is_relevant = self.is_relevant(&content);
        let (guest_count, event_date) = if is_relevant {
            (
                self.extract_guest_count(&content),
                self.extract_event_date(&content),
            )
        } else {
            (None, None)
        };

        if is_relevant {
            debug!(
                id = %message.id,
                guest_count = ?guest_count,
                event_date = ?event_date,
                "Message classified as inquiry"
            );
        }

        ClassifiedInquiry {
            message,
            is_relevant,
            guest_count,
            event_date,
        }
    }

    fn is_relevant(&self, content: &str) -> bool {
        let content = content.to_lowercase();
        INQUIRY_KEYWORDS.iter().any(|kw| content.contains(kw))
    }

    /// First matching pattern wins; its first captured group is the count.
    fn extract_guest_count(&self, text: &str) -> Option<u32> {
        for pattern in &self.guest_patterns {
            if let Some(caps) = pattern.captures(text) {
                if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse().ok()) {
                    return Some(n);
                }
            }
        }
        None
    }

    /// First matching pattern wins; the full matched substring is returned.
    fn extract_event_date(&self, text: &str) -> Option<String> {
        for pattern in &self.date_patterns {
            if let Some(m) = pattern.find(text) {
                return Some(m.as_str().to_string());
            }
        }
        None
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}
