//! Settings types.
//!
//! Every section uses `#[serde(default)]` so a settings file only needs the
//! keys it changes.

use std::path::PathBuf;

use amf_core::TraceLevel;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Default body limit for `cmd=exec` requests (3 MiB).
pub const DEFAULT_MAX_JSON_BYTES: usize = 3 * 1024 * 1024;
/// Default body limit for `cmd=upload` requests (300 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 300 * 1024 * 1024;
/// Default lifetime of a `GLOBAL` session record (96 hours).
pub const DEFAULT_GLOBAL_TTL_SECS: u64 = 96 * 3600;
/// Default lifetime of a `TAB` session record (1 hour).
pub const DEFAULT_TAB_TTL_SECS: u64 = 3600;

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AmfSettings {
    /// HTTP transport settings.
    pub server: ServerSettings,
    /// Module discovery settings.
    pub modules: ModuleSettings,
    /// Session tier settings.
    pub session: SessionSettings,
    /// Session store settings.
    pub store: StoreSettings,
    /// Logging and call tracing.
    pub logging: LoggingSettings,
}

impl AmfSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.session.global_ttl_secs == 0 || self.session.tab_ttl_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "session TTLs must be positive".into(),
            ));
        }
        if !self.server.remote_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "remotePath must start with '/': {}",
                self.server.remote_path
            )));
        }
        if self.store.pool_size == 0 {
            return Err(SettingsError::InvalidValue("store.poolSize must be positive".into()));
        }
        Ok(())
    }
}

/// HTTP transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// TCP port (`0` for auto-assign).
    pub port: u16,
    /// Listen on this unix socket instead of TCP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unix_socket: Option<PathBuf>,
    /// Path the call endpoint is mounted on.
    pub remote_path: String,
    /// Static directory served for requests without `cmd`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_path: Option<PathBuf>,
    /// Body limit for `cmd=exec`.
    pub max_json_bytes: usize,
    /// Body limit for `cmd=upload`.
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            unix_socket: None,
            remote_path: "/".to_string(),
            root_path: None,
            max_json_bytes: DEFAULT_MAX_JSON_BYTES,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Module discovery settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleSettings {
    /// Directory scanned for `*.module.json` manifests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Session tier settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Lifetime of a `GLOBAL` record since its last touch.
    pub global_ttl_secs: u64,
    /// Lifetime of a `TAB` record since its last touch.
    pub tab_ttl_secs: u64,
    /// Maximum expired records deleted per sweep.
    pub sweep_limit: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            global_ttl_secs: DEFAULT_GLOBAL_TTL_SECS,
            tab_ttl_secs: DEFAULT_TAB_TTL_SECS,
            sweep_limit: 256,
        }
    }
}

/// Session store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// `SQLite` database file.
    pub db_path: PathBuf,
    /// Connection pool size.
    pub pool_size: u32,
    /// `SQLite` busy timeout.
    pub busy_timeout_ms: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("amf.db"),
            pool_size: 8,
            busy_timeout_ms: 5000,
        }
    }
}

/// Logging and call tracing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum log level (`RUST_LOG` wins when set).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
    /// Call tracing verbosity.
    pub trace: TraceLevel,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            trace: TraceLevel::Off,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_match_session_tiers() {
        let s = AmfSettings::default();
        assert_eq!(s.session.global_ttl_secs, 345_600);
        assert_eq!(s.session.tab_ttl_secs, 3600);
    }

    #[test]
    fn defaults_match_body_limits() {
        let s = ServerSettings::default();
        assert_eq!(s.max_json_bytes, 3 * 1024 * 1024);
        assert_eq!(s.max_upload_bytes, 300 * 1024 * 1024);
        assert_eq!(s.remote_path, "/");
    }

    #[test]
    fn defaults_validate() {
        AmfSettings::default().validate().unwrap();
    }

    #[test]
    fn zero_ttl_is_invalid() {
        let mut s = AmfSettings::default();
        s.session.tab_ttl_secs = 0;
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn relative_remote_path_is_invalid() {
        let mut s = AmfSettings::default();
        s.server.remote_path = "api".into();
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("api"));
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(AmfSettings::default()).unwrap();
        assert!(json["session"]["globalTtlSecs"].is_number());
        assert!(json["server"]["maxUploadBytes"].is_number());
        assert!(json["server"].get("unixSocket").is_none());
    }

    #[test]
    fn partial_section_uses_defaults() {
        let s: AmfSettings =
            serde_json::from_str(r#"{"session": {"tabTtlSecs": 60}}"#).unwrap();
        assert_eq!(s.session.tab_ttl_secs, 60);
        assert_eq!(s.session.global_ttl_secs, DEFAULT_GLOBAL_TTL_SECS);
        assert_eq!(s.server.port, 8080);
    }
}
