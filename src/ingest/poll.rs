//! Poll ingestor — scheduled scan of the unread mailbox window.
//!
//! Each run: list unread since the timestamp watermark, drive every message
//! through the relay chain, mark it read, then advance the watermark to the
//! run's start time. Per-message failures are isolated; a run-level listing
//! failure aborts without advancing so the same window is retried on the
//! next tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::classify::Classifier;
use crate::cursor::CursorStore;
use crate::error::{Error, Result};
use crate::ingest::relay_one;
use crate::mail::Mailbox;
use crate::notify::Notifier;

/// Report of one poll run. Failures here are per-message and already logged;
/// the run itself completed and advanced the watermark.
#[derive(Debug, Clone, Default)]
pub struct PollOutcome {
    pub listed: usize,
    pub notified: usize,
    pub failed: usize,
}

/// Scheduled ingestor over the mailbox's unread query.
pub struct PollIngestor {
    mailbox: Arc<dyn Mailbox>,
    cursor: Arc<dyn CursorStore>,
    notifier: Arc<dyn Notifier>,
    classifier: Classifier,
    max_batch: u32,
}

impl PollIngestor {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        cursor: Arc<dyn CursorStore>,
        notifier: Arc<dyn Notifier>,
        classifier: Classifier,
        max_batch: u32,
    ) -> Self {
        Self {
            mailbox,
            cursor,
            notifier,
            classifier,
            max_batch,
        }
    }

    /// Run a single poll cycle: list → process batch → advance watermark.
    pub async fn run_once(&self) -> Result<PollOutcome> {
        let run_started = Utc::now().timestamp();
        let since = self.cursor.last_checked_time().await;

        let ids = match self.mailbox.list_unread(since, self.max_batch).await {
            Ok(ids) => ids,
            Err(e) if e.is_auth() => {
                warn!("Mailbox rejected credentials, triggering refresh");
                if let Err(refresh_err) = self.mailbox.refresh_credentials().await {
                    error!("Credential refresh failed: {refresh_err}");
                }
                // Watermark untouched; the same window is retried next tick.
                return Err(e.into());
            }
            Err(e) => {
                self.notifier
                    .post_error(&e.to_string(), "poll: listing unread messages")
                    .await;
                return Err(e.into());
            }
        };

        if ids.is_empty() {
            debug!(since, "No new messages");
            return Ok(PollOutcome::default());
        }

        info!(count = ids.len(), since, "Processing unread messages");

        let mut outcome = PollOutcome {
            listed: ids.len(),
            ..Default::default()
        };

        for id in &ids {
            match self.process_message(id).await {
                Ok(notified) => {
                    if notified {
                        outcome.notified += 1;
                    }
                }
                Err(e) => {
                    // Isolated: one bad message never blocks the rest.
                    error!(id = %id, "Failed to process message: {e}");
                    outcome.failed += 1;
                }
            }
        }

        // Advance even when individual messages failed; a permanently
        // failing message is retried only while it stays unread.
        self.cursor.set_last_checked_time(run_started).await;

        Ok(outcome)
    }

    /// One message end to end. Read-marking is last so a failed delivery
    /// leaves the message unread for the next run.
    async fn process_message(&self, id: &str) -> Result<bool> {
        let notified = relay_one(
            self.mailbox.as_ref(),
            &self.classifier,
            self.notifier.as_ref(),
            id,
        )
        .await?;

        self.mailbox.mark_read(id).await?;
        Ok(notified)
    }
}

/// Spawn the background poll loop.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop polling.
pub fn spawn_poll_ticker(
    ingestor: Arc<PollIngestor>,
    interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!("Poll ingestor started — polling every {}s", interval.as_secs());

        let mut tick = tokio::time::interval(interval);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Poll ingestor shutting down");
                return;
            }

            match ingestor.run_once().await {
                Ok(outcome) if outcome.listed > 0 => {
                    info!(
                        listed = outcome.listed,
                        notified = outcome.notified,
                        failed = outcome.failed,
                        "Poll run complete"
                    );
                }
                Ok(_) => {}
                Err(Error::Mailbox(e)) if e.is_auth() => {
                    // Refresh already attempted inside run_once.
                    warn!("Poll run aborted on auth error: {e}");
                }
                Err(e) => {
                    error!("Poll run failed: {e}");
                }
            }
        }
    });

    (handle, shutdown_flag)
}
