//! Boot sequence: store, registry, module host, dispatcher, server.

use std::sync::Arc;

use amf_runtime::{Dispatcher, ModuleCatalog, ModuleHost, ModuleRegistry, SessionEnv, SessionTtls};
use amf_server::{AmfServer, ServerConfig};
use amf_settings::AmfSettings;
use amf_store::{ConnectionConfig, SqliteSessionStore};
use anyhow::{Context, Result};
use tracing::info;

use crate::{commands, modules};

/// A booted server: every singleton is running, nothing is listening yet.
pub struct App {
    host: Arc<ModuleHost>,
    server: AmfServer,
}

impl App {
    /// Open the session store, resolve and boot the modules, and build the
    /// server.
    pub async fn boot(settings: AmfSettings, catalog: &ModuleCatalog) -> Result<Self> {
        let store_config = ConnectionConfig {
            pool_size: settings.store.pool_size,
            busy_timeout_ms: settings.store.busy_timeout_ms,
        };
        let store = SqliteSessionStore::open(&settings.store.db_path, &store_config)
            .with_context(|| {
                format!("Failed to open session store at {}", settings.store.db_path.display())
            })?
            .with_sweep_limit(settings.session.sweep_limit);

        let registry = match &settings.modules.path {
            Some(dir) => ModuleRegistry::discover(dir, catalog)
                .with_context(|| format!("Module discovery failed in {}", dir.display()))?,
            None => ModuleRegistry::from_catalog(catalog).context("Invalid module catalog")?,
        };
        info!(modules = registry.len(), tiers = registry.tiers().len(), "modules resolved");

        let ttls = SessionTtls::from_settings(&settings.session);
        let trace = settings.logging.trace;
        let server_config = ServerConfig::from(&settings.server);

        let host = Arc::new(ModuleHost::new(
            Arc::new(registry),
            Arc::new(settings),
            Arc::new(store),
        ));
        host.boot().await.context("Module boot failed")?;

        let env = SessionEnv::new(&host, modules::session_hooks(), ttls);
        let server = AmfServer::new(server_config, Dispatcher::new(env, trace))
            .with_commands(commands::commands());
        Ok(Self { host, server })
    }

    /// The HTTP server.
    pub fn server(&self) -> &AmfServer {
        &self.server
    }

    /// The module host.
    pub fn host(&self) -> &Arc<ModuleHost> {
        &self.host
    }

    /// Serve until SIGINT/SIGTERM, drain the listener, then destroy the
    /// singletons.
    pub async fn run_until_shutdown(self) -> Result<()> {
        let handle = self.server.serve().await.context("Failed to bind listener")?;
        let shutdown = Arc::clone(self.server.shutdown());
        let signals = shutdown.listen_for_signals();

        shutdown.wait().await;
        shutdown.drain(handle, None).await;
        signals.abort();

        self.host.shutdown().await;
        info!("shutdown complete");
        Ok(())
    }
}
