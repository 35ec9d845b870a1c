//! Mailbox provider — Gmail auth, client, and wire types.

pub mod auth;
pub mod client;
pub mod types;

pub use auth::GmailAuth;
pub use client::{GmailClient, Mailbox};
