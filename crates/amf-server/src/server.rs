//! `AmfServer`: axum router and listeners.

use std::net::SocketAddr;
#[cfg(unix)]
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use amf_runtime::Dispatcher;
use axum::Router;
use axum::extract::State;
use axum::http::{Method, header};
use axum::response::Json;
use axum::routing::{any, get};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::commands::CommandRegistry;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::remote;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Batch executor.
    pub dispatcher: Arc<Dispatcher>,
    /// Routing and body limits.
    pub config: Arc<ServerConfig>,
    /// Application `?cmd=` handlers.
    pub commands: Arc<CommandRegistry>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
}

/// The HTTP front of the dispatch engine.
pub struct AmfServer {
    config: Arc<ServerConfig>,
    dispatcher: Arc<Dispatcher>,
    commands: Arc<CommandRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl AmfServer {
    /// Create a server.
    pub fn new(config: ServerConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            commands: Arc::new(CommandRegistry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Serve `commands` next to the built-in `exec` and `upload`.
    pub fn with_commands(mut self, commands: CommandRegistry) -> Self {
        self.commands = Arc::new(commands);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            dispatcher: self.dispatcher.clone(),
            config: self.config.clone(),
            commands: self.commands.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
        };
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);

        Router::new()
            .route("/health", get(health_handler))
            .route(&self.config.remote_path, any(remote::remote_handler))
            .fallback(remote::static_fallback)
            .with_state(state)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Bind `host:port` and serve until shutdown.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        info!(%addr, remote_path = %self.config.remote_path, "AMF server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server loop failed");
            }
        });
        Ok((addr, handle))
    }

    /// Bind a unix socket at `path` and serve until shutdown.
    ///
    /// A stale socket file is removed first; the socket is world-writable
    /// so a front proxy running as another user can connect.
    #[cfg(unix)]
    pub async fn listen_unix(&self, path: &Path) -> std::io::Result<JoinHandle<()>> {
        use std::os::unix::fs::PermissionsExt;

        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let listener = tokio::net::UnixListener::bind(path)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))?;
        info!(path = %path.display(), remote_path = %self.config.remote_path, "AMF server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let path = path.to_path_buf();
        Ok(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server loop failed");
            }
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove socket file");
            }
        }))
    }

    /// Serve on whichever listener the configuration names.
    pub async fn serve(&self) -> std::io::Result<JoinHandle<()>> {
        #[cfg(unix)]
        if let Some(path) = self.config.unix_socket.clone() {
            return self.listen_unix(&path).await;
        }
        let (_addr, handle) = self.listen().await?;
        Ok(handle)
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.dispatcher.env().registry().len(),
        state.shutdown.is_shutting_down(),
    ))
}
