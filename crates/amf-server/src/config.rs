//! Server configuration.

use std::path::PathBuf;

use amf_settings::ServerSettings;
use amf_settings::types::{DEFAULT_MAX_JSON_BYTES, DEFAULT_MAX_UPLOAD_BYTES};
use serde::{Deserialize, Serialize};

/// Listener and routing configuration of an [`AmfServer`](crate::AmfServer).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Serve on this unix socket instead of TCP.
    pub unix_socket: Option<PathBuf>,
    /// Path the call endpoint is mounted on.
    pub remote_path: String,
    /// Static asset directory for requests without `cmd`.
    pub root_path: Option<PathBuf>,
    /// Body limit of `cmd=exec`.
    pub max_json_bytes: usize,
    /// Body limit of `cmd=upload`.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            unix_socket: None,
            remote_path: "/".into(),
            root_path: None,
            max_json_bytes: DEFAULT_MAX_JSON_BYTES,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            unix_socket: settings.unix_socket.clone(),
            remote_path: settings.remote_path.clone(),
            root_path: settings.root_path.clone(),
            max_json_bytes: settings.max_json_bytes,
            max_upload_bytes: settings.max_upload_bytes,
        }
    }
}

impl ServerConfig {
    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_zero() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn from_settings_copies_every_field() {
        let settings = ServerSettings {
            host: "0.0.0.0".into(),
            port: 9000,
            unix_socket: Some("/tmp/amf.sock".into()),
            remote_path: "/rpc".into(),
            root_path: Some("/srv/www".into()),
            max_json_bytes: 10,
            max_upload_bytes: 20,
        };
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:9000");
        assert_eq!(cfg.unix_socket.as_deref(), Some(std::path::Path::new("/tmp/amf.sock")));
        assert_eq!(cfg.remote_path, "/rpc");
        assert_eq!(cfg.max_json_bytes, 10);
        assert_eq!(cfg.max_upload_bytes, 20);
    }
}
