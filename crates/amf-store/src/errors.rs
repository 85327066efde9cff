//! Error types for the session store.

use amf_core::SessionKind;
use thiserror::Error;

/// Errors that can occur during session store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error (no connection could be obtained).
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Stored items were not a JSON object.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// The blocking worker running a store operation failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Every generated id collided with a live record.
    #[error("could not allocate a {kind} session id after {attempts} attempts")]
    IdExhausted {
        /// Tier the id was generated for.
        kind: SessionKind,
        /// Number of ids tried.
        attempts: u32,
    },
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
