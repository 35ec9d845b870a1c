use std::sync::Arc;
use std::time::Duration;

use inquiry_relay::classify::Classifier;
use inquiry_relay::config::RelayConfig;
use inquiry_relay::cursor::{CursorStore, LibSqlCursorStore, MemoryCursorStore};
use inquiry_relay::ingest::poll::{PollIngestor, spawn_poll_ticker};
use inquiry_relay::ingest::push::{PushIngestor, webhook_routes};
use inquiry_relay::mail::{GmailAuth, GmailClient, Mailbox};
use inquiry_relay::notify::{Notifier, SlackNotifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RelayConfig::from_env()?;

    eprintln!("📬 inquiry-relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {}", config.gmail.user_email);
    eprintln!("   Slack channel: {}", config.slack.channel);
    eprintln!("   Poll interval: {}s", config.poll_interval_secs);
    eprintln!("   Webhook: http://0.0.0.0:{}/gmail/webhook", config.port);

    let http = reqwest::Client::new();

    // ── Cursor store ────────────────────────────────────────────────
    let cursor: Arc<dyn CursorStore> = match config.db_path.as_deref() {
        Some(path) => {
            eprintln!("   Cursor database: {path}");
            Arc::new(LibSqlCursorStore::open(std::path::Path::new(path)).await?)
        }
        None => {
            tracing::warn!("RELAY_DB_PATH not set — cursors are in-memory and reset on restart");
            Arc::new(MemoryCursorStore::new())
        }
    };

    // ── Shared collaborators ────────────────────────────────────────
    let auth = GmailAuth::new(config.gmail.clone(), http.clone());
    let mailbox: Arc<dyn Mailbox> = Arc::new(GmailClient::new(
        auth,
        http.clone(),
        config.gmail.user_email.clone(),
    ));
    let notifier: Arc<dyn Notifier> = Arc::new(SlackNotifier::new(
        config.slack.token.clone(),
        config.slack.channel.clone(),
        http,
    ));

    // ── Ingestors ───────────────────────────────────────────────────
    let poll = Arc::new(PollIngestor::new(
        Arc::clone(&mailbox),
        Arc::clone(&cursor),
        Arc::clone(&notifier),
        Classifier::new(),
        config.max_batch,
    ));
    let push = Arc::new(PushIngestor::new(
        mailbox,
        cursor,
        notifier,
        Classifier::new(),
    ));

    let (_poll_handle, _shutdown) =
        spawn_poll_ticker(poll, Duration::from_secs(config.poll_interval_secs));

    // ── Webhook server ──────────────────────────────────────────────
    let app = webhook_routes(push);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Webhook server started");
    axum::serve(listener, app).await?;

    Ok(())
}
