//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`AmfSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `AMF_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use amf_core::TraceLevel;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::AmfSettings;

/// Longest accepted session TTL (one year).
const MAX_TTL_SECS: u64 = 365 * 24 * 3600;

/// Load settings from `path` with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a value that fails
/// [`AmfSettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<AmfSettings> {
    let defaults = serde_json::to_value(AmfSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: AmfSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `AMF_*` environment variables to loaded settings.
pub fn apply_env_overrides(settings: &mut AmfSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are logged and ignored (falling back to file/default).
pub fn apply_overrides(settings: &mut AmfSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("AMF_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16_range("AMF_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("AMF_UNIX_SOCKET") {
        settings.server.unix_socket = Some(PathBuf::from(v));
    }
    if let Some(v) = env.string("AMF_REMOTE_PATH") {
        settings.server.remote_path = v;
    }
    if let Some(v) = env.string("AMF_ROOT_PATH") {
        settings.server.root_path = Some(PathBuf::from(v));
    }

    // ── Modules / store ─────────────────────────────────────────────
    if let Some(v) = env.string("AMF_MODULE_DIR") {
        settings.modules.path = Some(PathBuf::from(v));
    }
    if let Some(v) = env.string("AMF_DB_PATH") {
        settings.store.db_path = PathBuf::from(v);
    }

    // ── Session tiers ───────────────────────────────────────────────
    if let Some(v) = env.u64_range("AMF_GLOBAL_TTL_SECS", 1, MAX_TTL_SECS) {
        settings.session.global_ttl_secs = v;
    }
    if let Some(v) = env.u64_range("AMF_TAB_TTL_SECS", 1, MAX_TTL_SECS) {
        settings.session.tab_ttl_secs = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("AMF_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("AMF_LOG_JSON") {
        settings.logging.json = v;
    }
    if let Some(v) = env.trace_level("AMF_DEBUG") {
        settings.logging.trace = v;
    }
}

/// Parse a boolean env var value.
///
/// Accepts `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off` (case-insensitive).
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16_range(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.string(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64_range(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn trace_level(&self, name: &str) -> Option<TraceLevel> {
        let val = self.string(name)?;
        match val.parse() {
            Ok(level) => Some(level),
            Err(e) => {
                warn!(key = name, value = %val, error = %e, "invalid trace level env var, ignoring");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
