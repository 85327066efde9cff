//! TTL-scoped session records.
//!
//! Each record is keyed by `(kind, id)` and carries a JSON object of items
//! plus the unix-millisecond timestamp of its last touch. A record is live
//! while `now - last_touched <= ttl`. Expired records are never read; they
//! are swept in small batches whenever a lookup misses.
//!
//! Lookup-or-create runs in one `IMMEDIATE` transaction so two concurrent
//! requests can neither refresh a record that a sweep is deleting nor insert
//! the same fresh id twice.

use std::time::Duration;

use amf_core::{SessionId, SessionKind};
use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::connection::{ConnectionConfig, ConnectionPool};
use crate::errors::{Result, StoreError};
use crate::migrations::run_migrations;

/// Item map persisted with a session record.
pub type Items = Map<String, Value>;

/// Ids generated before giving up on a collision streak.
const MAX_ID_ATTEMPTS: u32 = 8;

/// Default number of expired records deleted per sweep.
pub const DEFAULT_SWEEP_LIMIT: u32 = 256;

/// A resolved session record.
#[derive(Clone, Debug, PartialEq)]
pub struct StartedSession {
    /// Live id (the presented one, or a freshly generated one).
    pub id: SessionId,
    /// Stored items (`{}` for a new record).
    pub items: Items,
    /// Whether the record was created by this call.
    pub created: bool,
}

/// Durable store for the `GLOBAL` and `TAB` session tiers.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Refresh and return the live record for `id`, or create a new one.
    ///
    /// A missing, unknown or expired `id` yields a fresh id with empty items.
    async fn start_session(
        &self,
        kind: SessionKind,
        id: Option<&SessionId>,
        ttl: Duration,
    ) -> Result<StartedSession>;

    /// Write `items` back and touch the record, creating it if it is gone.
    async fn end_session(&self, kind: SessionKind, id: &SessionId, items: &Items) -> Result<()>;
}

/// [`SessionStore`] over a pooled `SQLite` database.
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: ConnectionPool,
    sweep_limit: u32,
}

impl SqliteSessionStore {
    /// Wrap a pool whose schema is already migrated.
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            sweep_limit: DEFAULT_SWEEP_LIMIT,
        }
    }

    /// Open (or create) a database file and apply migrations.
    pub fn open(path: &std::path::Path, config: &ConnectionConfig) -> Result<Self> {
        let pool = crate::connection::new_file(path, config)?;
        let _ = run_migrations(&*pool.get()?)?;
        Ok(Self::new(pool))
    }

    /// Migrated in-memory store (for tests).
    pub fn in_memory() -> Result<Self> {
        let pool = crate::connection::new_in_memory(&ConnectionConfig::default())?;
        let _ = run_migrations(&*pool.get()?)?;
        Ok(Self::new(pool))
    }

    /// Set the maximum number of expired records deleted per sweep.
    #[must_use]
    pub fn with_sweep_limit(mut self, limit: u32) -> Self {
        self.sweep_limit = limit.max(1);
        self
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Number of stored records of `kind`, live or expired.
    pub async fn count(&self, kind: SessionKind) -> Result<u64> {
        let pool = self.pool.clone();
        run_blocking(move || {
            let conn = pool.get()?;
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sessions WHERE kind = ?1",
                params![kind.as_str()],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(n).unwrap_or(0))
        })
        .await
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    #[instrument(skip(self, id), fields(kind = %kind))]
    async fn start_session(
        &self,
        kind: SessionKind,
        id: Option<&SessionId>,
        ttl: Duration,
    ) -> Result<StartedSession> {
        let pool = self.pool.clone();
        let id = id.cloned();
        let sweep_limit = self.sweep_limit;
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        run_blocking(move || {
            let mut conn = pool.get()?;
            start_session_blocking(&mut conn, kind, id.as_ref(), ttl_ms, sweep_limit, now_ms())
        })
        .await
    }

    #[instrument(skip(self, items), fields(kind = %kind, id = %id))]
    async fn end_session(&self, kind: SessionKind, id: &SessionId, items: &Items) -> Result<()> {
        let pool = self.pool.clone();
        let id = id.clone();
        let raw = serde_json::to_string(items)?;

        run_blocking(move || {
            let conn = pool.get()?;
            let _ = conn.execute(
                "INSERT INTO sessions (kind, id, last_touched, items) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (kind, id) DO UPDATE
                 SET last_touched = excluded.last_touched, items = excluded.items",
                params![kind.as_str(), id.as_str(), now_ms(), raw],
            )?;
            Ok(())
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal
// ─────────────────────────────────────────────────────────────────────────────

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
}

fn start_session_blocking(
    conn: &mut Connection,
    kind: SessionKind,
    id: Option<&SessionId>,
    ttl_ms: i64,
    sweep_limit: u32,
    now: i64,
) -> Result<StartedSession> {
    let cutoff = now.saturating_sub(ttl_ms);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(id) = id {
        let refreshed = tx.execute(
            "UPDATE sessions SET last_touched = ?1
             WHERE kind = ?2 AND id = ?3 AND last_touched >= ?4",
            params![now, kind.as_str(), id.as_str(), cutoff],
        )?;
        if refreshed == 1 {
            let raw: Option<String> = tx
                .query_row(
                    "SELECT items FROM sessions WHERE kind = ?1 AND id = ?2",
                    params![kind.as_str(), id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let items = parse_items(raw.as_deref())?;
            tx.commit()?;
            return Ok(StartedSession {
                id: id.clone(),
                items,
                created: false,
            });
        }
        let _ = tx.execute(
            "DELETE FROM sessions WHERE kind = ?1 AND id = ?2 AND last_touched < ?3",
            params![kind.as_str(), id.as_str(), cutoff],
        )?;
        debug!(kind = %kind, "presented session id not live, issuing a new one");
    }

    let swept = tx.execute(
        "DELETE FROM sessions WHERE rowid IN (
           SELECT rowid FROM sessions WHERE kind = ?1 AND last_touched < ?2 LIMIT ?3
         )",
        params![kind.as_str(), cutoff, sweep_limit],
    )?;
    if swept > 0 {
        debug!(kind = %kind, swept, "swept expired sessions");
    }

    for attempt in 1..=MAX_ID_ATTEMPTS {
        let candidate = SessionId::generate();
        let inserted = tx.execute(
            "INSERT INTO sessions (kind, id, last_touched, items) VALUES (?1, ?2, ?3, '{}')",
            params![kind.as_str(), candidate.as_str(), now],
        );
        match inserted {
            Ok(_) => {
                tx.commit()?;
                return Ok(StartedSession {
                    id: candidate,
                    items: Items::new(),
                    created: true,
                });
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                warn!(kind = %kind, attempt, "session id collision, regenerating");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(StoreError::IdExhausted {
        kind,
        attempts: MAX_ID_ATTEMPTS,
    })
}

fn parse_items(raw: Option<&str>) -> Result<Items> {
    match raw {
        None => Ok(Items::new()),
        Some(raw) => Ok(serde_json::from_str(raw)?),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
