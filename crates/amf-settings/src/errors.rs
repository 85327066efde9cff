//! Settings errors.

use thiserror::Error;

/// Why [`AmfSettings`](crate::AmfSettings) could not be produced.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not JSON, or a section has the wrong shape.
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),
    /// A value parsed but breaks a constraint.
    #[error("invalid setting: {0}")]
    InvalidValue(String),
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, SettingsError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
