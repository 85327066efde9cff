//! Command line interface.

use std::path::PathBuf;

use amf_core::TraceLevel;
use amf_settings::{AmfSettings, load_settings_from_path};
use anyhow::{Context, Result};
use clap::Parser;

/// Session-scoped module server.
#[derive(Parser, Debug)]
#[command(name = "amf", about = "Session-scoped module server", version)]
pub struct Cli {
    /// Settings file (JSON). Missing file means defaults.
    #[arg(long, default_value = "amf.json")]
    pub config: PathBuf,

    /// Host to bind.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    pub port: Option<u16>,

    /// Serve on a unix socket instead of TCP.
    #[arg(long)]
    pub unix_socket: Option<PathBuf>,

    /// Directory scanned for `*.module.json` manifests.
    #[arg(long)]
    pub module_dir: Option<PathBuf>,

    /// Path to the `SQLite` session database.
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Static asset directory.
    #[arg(long)]
    pub root_path: Option<PathBuf>,

    /// Call tracing: `off`, `calls` or `full`.
    #[arg(long)]
    pub debug: Option<TraceLevel>,

    /// Log filter (overridden by `RUST_LOG`).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    /// Load the settings file, then layer env vars and flags on top.
    pub fn load_settings(&self) -> Result<AmfSettings> {
        let mut settings = load_settings_from_path(&self.config)
            .with_context(|| format!("Failed to load settings from {}", self.config.display()))?;
        self.apply(&mut settings);
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }

    /// Override `settings` with every flag that was given.
    pub fn apply(&self, settings: &mut AmfSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.unix_socket {
            settings.server.unix_socket = Some(path.clone());
        }
        if let Some(path) = &self.root_path {
            settings.server.root_path = Some(path.clone());
        }
        if let Some(dir) = &self.module_dir {
            settings.modules.path = Some(dir.clone());
        }
        if let Some(path) = &self.db_path {
            settings.store.db_path.clone_from(path);
        }
        if let Some(level) = self.debug {
            settings.logging.trace = level;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["amf"]);
        assert_eq!(cli.config, PathBuf::from("amf.json"));
        let mut settings = AmfSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings, AmfSettings::default());
    }

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from([
            "amf",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
            "--db-path",
            "/var/lib/amf.db",
            "--module-dir",
            "modules",
            "--debug",
            "calls",
            "--log-level",
            "debug",
            "--log-json",
        ]);
        let mut settings = AmfSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.store.db_path, PathBuf::from("/var/lib/amf.db"));
        assert_eq!(settings.modules.path, Some(PathBuf::from("modules")));
        assert_eq!(settings.logging.trace, TraceLevel::Calls);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn debug_accepts_loose_values() {
        let cli = Cli::parse_from(["amf", "--debug", "true"]);
        assert_eq!(cli.debug, Some(TraceLevel::Full));
        assert!(Cli::try_parse_from(["amf", "--debug", "loud"]).is_err());
    }

    #[test]
    fn load_settings_reads_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("amf.json");
        std::fs::write(&path, r#"{"server": {"port": 7000, "host": "10.0.0.1"}}"#).unwrap();
        let cli = Cli::parse_from([
            "amf",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "7001",
        ]);
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.server.host, "10.0.0.1");
        assert_eq!(settings.server.port, 7001);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("amf.json");
        std::fs::write(&path, "{nope").unwrap();
        let cli = Cli::parse_from(["amf", "--config", path.to_str().unwrap()]);
        assert!(cli.load_settings().is_err());
    }
}
