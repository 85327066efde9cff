//! Embedded schema migrations.
//!
//! Each step is applied at most once, inside its own transaction, and
//! recorded in `schema_version`.

use rusqlite::{Connection, params};
use tracing::info;

use crate::errors::{Result, StoreError};

/// `(version, label, sql)` in ascending version order.
const STEPS: &[(u32, &str, &str)] = &[(1, "sessions table", include_str!("v001_schema.sql"))];

const VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_version (
    version    INTEGER PRIMARY KEY,
    label      TEXT    NOT NULL,
    applied_at INTEGER NOT NULL DEFAULT (unixepoch())
)";

/// Bring the schema up to date. Returns how many steps ran.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    conn.execute_batch(VERSION_TABLE)
        .map_err(|e| failed("create schema_version", &e))?;
    let from = schema_version(conn)?;

    let mut ran = 0;
    for &(version, label, sql) in STEPS.iter().filter(|(v, _, _)| *v > from) {
        info!(version, label, "migrating session store");
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| failed(&format!("v{version} begin"), &e))?;
        tx.execute_batch(sql)
            .map_err(|e| failed(&format!("v{version} ({label})"), &e))?;
        let _ = tx
            .execute(
                "INSERT INTO schema_version (version, label) VALUES (?1, ?2)",
                params![version, label],
            )
            .map_err(|e| failed(&format!("v{version} record"), &e))?;
        tx.commit()
            .map_err(|e| failed(&format!("v{version} commit"), &e))?;
        ran += 1;
    }
    Ok(ran)
}

/// Highest applied version, `0` on a fresh database.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
        row.get(0)
    })
    .map_err(|e| failed("read schema_version", &e))
}

fn failed(step: &str, err: &rusqlite::Error) -> StoreError {
    StoreError::Migration {
        message: format!("{step}: {err}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn migrated() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 1);
        conn
    }

    #[test]
    fn fresh_database_reaches_latest() {
        let conn = migrated();
        let latest = STEPS.last().map(|s| s.0).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), latest);
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn rerun_applies_nothing() {
        let conn = migrated();
        assert_eq!(run_migrations(&conn).unwrap(), 0);
    }

    #[test]
    fn unknown_tier_is_rejected() {
        let conn = migrated();
        let inserted = conn.execute(
            "INSERT INTO sessions (kind, id, last_touched) VALUES ('other', 'x', 0)",
            [],
        );
        assert!(inserted.is_err());
    }
}
