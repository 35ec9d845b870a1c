//! Cursor store — the shared watermarks both ingestors advance.
//!
//! Two independent watermarks live here: `lastcheck` (epoch seconds, poll
//! path) and `historyid` (opaque monotonic token, push path). Reads that
//! fail fall back to the default lookback; writes that fail are logged and
//! swallowed — a lost watermark update only means the next run re-scans an
//! already-processed window, which the pipeline tolerates.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, params};
use tracing::{error, info, warn};

use crate::error::CursorError;

/// Lookback applied when no `lastcheck` watermark exists yet.
pub const DEFAULT_LOOKBACK_SECS: i64 = 3600;

const ROW_LASTCHECK: &str = "lastcheck";
const ROW_HISTORYID: &str = "historyid";

fn default_checked_time() -> i64 {
    Utc::now().timestamp() - DEFAULT_LOOKBACK_SECS
}

/// Persisted ingestion watermarks.
///
/// Both ingestors share one store; each field is normally advanced by only
/// one of them. Concurrent writers converge last-writer-wins, which is safe
/// because watermarks only move forward and a stale read causes benign
/// re-delivery, never loss.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Last poll watermark in epoch seconds, or `now - 3600` when absent.
    async fn last_checked_time(&self) -> i64;

    /// Advance the poll watermark. Called only after a completed batch.
    async fn set_last_checked_time(&self, ts: i64);

    /// Last history token, or `None` when never set.
    async fn last_history_id(&self) -> Option<u64>;

    /// Advance the history watermark. Called only after a completed batch.
    async fn set_last_history_id(&self, id: u64);
}

// ── In-memory fallback ──────────────────────────────────────────────

/// Non-durable store used when no database path is configured.
///
/// Watermarks reset on restart; the bounded default lookback keeps the
/// resulting re-scan window small.
#[derive(Default)]
pub struct MemoryCursorStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    last_checked: Option<i64>,
    history_id: Option<u64>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn last_checked_time(&self) -> i64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_checked.unwrap_or_else(default_checked_time)
    }

    async fn set_last_checked_time(&self, ts: i64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_checked = Some(ts);
    }

    async fn last_history_id(&self) -> Option<u64> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.history_id
    }

    async fn set_last_history_id(&self, id: u64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.history_id = Some(id);
    }
}

// ── libSQL backend ──────────────────────────────────────────────────

/// Durable store on a local libSQL database.
///
/// Single `cursors` table with one row per watermark name. Upserts are
/// idempotent; the `updated_at` column is audit-only.
pub struct LibSqlCursorStore {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: Connection,
}

impl LibSqlCursorStore {
    /// Open (or create) a local database file and ensure the schema.
    pub async fn open(path: &Path) -> Result<Self, CursorError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CursorError::Backend(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CursorError::Backend(format!("Failed to open database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| CursorError::Backend(format!("Failed to create connection: {e}")))?;

        let store = Self { db, conn };
        store.init_schema().await?;
        info!(path = %path.display(), "Cursor database opened");
        Ok(store)
    }

    /// In-memory database (for tests).
    pub async fn open_memory() -> Result<Self, CursorError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| CursorError::Backend(format!("Failed to open database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| CursorError::Backend(format!("Failed to create connection: {e}")))?;

        let store = Self { db, conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), CursorError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS cursors (
                    name TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
                (),
            )
            .await
            .map_err(|e| CursorError::Query(format!("init_schema: {e}")))?;
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<Option<String>, CursorError> {
        let mut rows = self
            .conn
            .query("SELECT value FROM cursors WHERE name = ?1", params![name])
            .await
            .map_err(|e| CursorError::Query(format!("read {name}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| CursorError::Query(format!("read {name} row: {e}")))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(CursorError::Query(format!("read {name}: {e}"))),
        }
    }

    async fn write(&self, name: &str, value: &str) -> Result<(), CursorError> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO cursors (name, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![name, value, now],
            )
            .await
            .map_err(|e| CursorError::Query(format!("write {name}: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl CursorStore for LibSqlCursorStore {
    async fn last_checked_time(&self) -> i64 {
        match self.read(ROW_LASTCHECK).await {
            Ok(Some(value)) => match value.parse() {
                Ok(ts) => ts,
                Err(_) => {
                    warn!(value = %value, "Unparseable lastcheck cursor, using default lookback");
                    default_checked_time()
                }
            },
            Ok(None) => default_checked_time(),
            Err(e) => {
                error!("Failed to read lastcheck cursor: {e}");
                default_checked_time()
            }
        }
    }

    async fn set_last_checked_time(&self, ts: i64) {
        if let Err(e) = self.write(ROW_LASTCHECK, &ts.to_string()).await {
            error!("Failed to update lastcheck cursor: {e}");
        }
    }

    async fn last_history_id(&self) -> Option<u64> {
        match self.read(ROW_HISTORYID).await {
            Ok(Some(value)) => match value.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(value = %value, "Unparseable historyid cursor, treating as absent");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                error!("Failed to read historyid cursor: {e}");
                None
            }
        }
    }

    async fn set_last_history_id(&self, id: u64) {
        if let Err(e) = self.write(ROW_HISTORYID, &id.to_string()).await {
            error!("Failed to update historyid cursor: {e}");
        }
    }
}
