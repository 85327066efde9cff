//! # amf-settings
//!
//! Configuration for the amf server, loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`AmfSettings::default()`]
//! 2. **Settings file**: a JSON file deep-merged over the defaults
//! 3. **Environment variables**: `AMF_*` overrides (highest priority)
//!
//! Command-line flags of the binary are applied on top by the caller.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, apply_overrides, deep_merge, load_settings_from_path};
pub use types::*;
