//! inquiry-relay — relays catering inquiries from a mailbox to Slack.

pub mod classify;
pub mod config;
pub mod cursor;
pub mod error;
pub mod ingest;
pub mod mail;
pub mod normalize;
pub mod notify;
