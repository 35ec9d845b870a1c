//! Ingestors — the two independent entry points that discover new mail.
//!
//! The poll ingestor runs on a timer; the push ingestor runs on webhook
//! delivery. They never call each other, but share the cursor store and the
//! normalize → classify → notify chain.

pub mod poll;
pub mod push;

use tracing::{debug, info};

use crate::classify::Classifier;
use crate::error::Result;
use crate::mail::Mailbox;
use crate::normalize::normalize;
use crate::notify::Notifier;

/// Fetch one message and drive it through normalize → classify → notify.
///
/// Returns whether a notification was delivered. Read-marking is the poll
/// ingestor's concern and happens after this returns.
pub(crate) async fn relay_one(
    mailbox: &dyn Mailbox,
    classifier: &Classifier,
    notifier: &dyn Notifier,
    id: &str,
) -> Result<bool> {
    let raw = mailbox.get_message(id).await?;
    let message = normalize(&raw)?;
    let inquiry = classifier.classify(message);

    if !inquiry.is_relevant {
        debug!(id, "Message is not an inquiry");
        return Ok(false);
    }

    info!(
        id,
        from = %inquiry.message.from,
        subject = %inquiry.message.subject,
        "Relaying inquiry"
    );
    notifier.post_inquiry(&inquiry).await?;
    Ok(true)
}
