//! Per-request session context.
//!
//! A [`SessionContext`] is created for each request by [`SessionContext::init`],
//! which resolves the `GLOBAL` and `TAB` records, and closed by
//! [`SessionContext::finalize`], which runs end-of-session hooks and writes
//! both item maps back. Between the two it lazily binds module instances:
//! the live singleton for [`Lifecycle::Singleton`] modules, a fresh object
//! for [`Lifecycle::PerSession`] modules. Fresh objects are never shared
//! between sessions.

pub mod hooks;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use amf_core::{SessionId, SessionKind};
use amf_settings::SessionSettings;
use amf_store::{Items, SessionStore};
use bytes::Bytes;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, instrument, warn};

pub use hooks::SessionHooks;

use crate::errors::SessionError;
use crate::modules::{Instance, Lifecycle, ModuleContext, ModuleHost, ModuleRegistry, ModuleType};

/// Lifetimes of the two session tiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionTtls {
    /// `GLOBAL` record lifetime.
    pub global: Duration,
    /// `TAB` record lifetime.
    pub tab: Duration,
}

impl SessionTtls {
    /// Read the TTLs from settings.
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self {
            global: Duration::from_secs(settings.global_ttl_secs),
            tab: Duration::from_secs(settings.tab_ttl_secs),
        }
    }
}

impl Default for SessionTtls {
    fn default() -> Self {
        Self::from_settings(&SessionSettings::default())
    }
}

/// Everything a session needs from the process, shared by all requests.
#[derive(Clone)]
pub struct SessionEnv {
    modules: ModuleContext,
    hooks: Arc<SessionHooks>,
    ttls: SessionTtls,
}

impl SessionEnv {
    /// Build the environment over a booted host.
    pub fn new(host: &ModuleHost, hooks: SessionHooks, ttls: SessionTtls) -> Self {
        Self {
            modules: host.context().clone(),
            hooks: Arc::new(hooks),
            ttls,
        }
    }

    /// The module registry.
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        self.modules.registry()
    }

    /// The session store.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        self.modules.store()
    }

    /// Tier lifetimes.
    pub fn ttls(&self) -> SessionTtls {
        self.ttls
    }

    /// Registered session start hooks.
    pub fn hooks(&self) -> &SessionHooks {
        &self.hooks
    }
}

impl fmt::Debug for SessionEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEnv")
            .field("ttls", &self.ttls)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

/// A payload that replaces the default JSON response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header value.
    pub content_type: String,
    /// Response body.
    pub body: Bytes,
}

struct SessionInner {
    env: SessionEnv,
    global_id: SessionId,
    tab_id: SessionId,
    global_items: Mutex<Items>,
    session_items: Mutex<Items>,
    bound: Mutex<Vec<(String, Instance)>>,
    upload: Option<Bytes>,
    custom_response: Mutex<Option<RawResponse>>,
    finalized: AtomicBool,
}

/// State of one in-flight request. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

impl SessionContext {
    /// Resolve both session records and run the session start hooks.
    ///
    /// A missing, unknown or expired id is replaced by a fresh one. Hook
    /// failures are logged and do not fail the request.
    #[instrument(skip_all)]
    pub async fn init(
        env: &SessionEnv,
        global_id: Option<SessionId>,
        tab_id: Option<SessionId>,
        upload: Option<Bytes>,
    ) -> Result<Self, SessionError> {
        let store = env.store();
        let (global, tab) = tokio::try_join!(
            store.start_session(SessionKind::Global, global_id.as_ref(), env.ttls.global),
            store.start_session(SessionKind::Tab, tab_id.as_ref(), env.ttls.tab),
        )?;
        debug!(
            global = %global.id,
            tab = %tab.id,
            new_global = global.created,
            new_tab = tab.created,
            "session opened"
        );

        let session = Self {
            inner: Arc::new(SessionInner {
                env: env.clone(),
                global_id: global.id,
                tab_id: tab.id,
                global_items: Mutex::new(global.items),
                session_items: Mutex::new(tab.items),
                bound: Mutex::new(Vec::new()),
                upload,
                custom_response: Mutex::new(None),
                finalized: AtomicBool::new(false),
            }),
        };

        let (names, pending): (Vec<String>, Vec<_>) =
            env.hooks.run_all(&session).into_iter().unzip();
        let results = join_all(pending).await;
        for (name, result) in names.iter().zip(results) {
            if let Err(e) = result {
                warn!(hook = %name, error = %e, "session start hook failed");
            }
        }

        Ok(session)
    }

    /// The `GLOBAL` session id (`globalHash`).
    pub fn global_id(&self) -> &SessionId {
        &self.inner.global_id
    }

    /// The `TAB` session id (`sessionHash`).
    pub fn tab_id(&self) -> &SessionId {
        &self.inner.tab_id
    }

    /// Process-wide module services.
    pub fn modules(&self) -> &ModuleContext {
        &self.inner.env.modules
    }

    // ── Items ───────────────────────────────────────────────────────────

    /// Read a browser-wide item.
    pub fn global_item(&self, name: &str) -> Option<Value> {
        self.inner.global_items.lock().get(name).cloned()
    }

    /// Read a browser-wide item, or `default` when absent.
    pub fn global_item_or(&self, name: &str, default: Value) -> Value {
        self.global_item(name).unwrap_or(default)
    }

    /// Write a browser-wide item.
    pub fn set_global_item(&self, name: impl Into<String>, value: impl Into<Value>) {
        let _ = self
            .inner
            .global_items
            .lock()
            .insert(name.into(), value.into());
    }

    /// Remove a browser-wide item.
    pub fn remove_global_item(&self, name: &str) -> Option<Value> {
        self.inner.global_items.lock().remove(name)
    }

    /// Read a tab item.
    pub fn session_item(&self, name: &str) -> Option<Value> {
        self.inner.session_items.lock().get(name).cloned()
    }

    /// Read a tab item, or `default` when absent.
    pub fn session_item_or(&self, name: &str, default: Value) -> Value {
        self.session_item(name).unwrap_or(default)
    }

    /// Write a tab item.
    pub fn set_session_item(&self, name: impl Into<String>, value: impl Into<Value>) {
        let _ = self
            .inner
            .session_items
            .lock()
            .insert(name.into(), value.into());
    }

    /// Remove a tab item.
    pub fn remove_session_item(&self, name: &str) -> Option<Value> {
        self.inner.session_items.lock().remove(name)
    }

    /// Snapshot of all browser-wide items.
    pub fn global_items(&self) -> Items {
        self.inner.global_items.lock().clone()
    }

    /// Snapshot of all tab items.
    pub fn session_items(&self) -> Items {
        self.inner.session_items.lock().clone()
    }

    // ── Modules ─────────────────────────────────────────────────────────

    /// Bind `name` (and, first, everything it depends on) to this session.
    ///
    /// Repeated lookups return the same instance. An unknown name or a
    /// failing start hook is an error.
    pub async fn module(&self, name: &str) -> Result<Instance, SessionError> {
        if let Some(found) = self.bound_instance(name) {
            return Ok(found);
        }
        let chain = self
            .inner
            .env
            .registry()
            .dependency_closure(name)
            .map_err(|_| SessionError::UnknownModule(name.to_owned()))?;

        let mut target = None;
        for module in &chain {
            let instance = self.bind(module).await?;
            if module == name {
                target = Some(instance);
            }
        }
        target.ok_or_else(|| SessionError::UnknownModule(name.to_owned()))
    }

    /// Typed [`module`](Self::module).
    pub async fn module_of<M: ModuleType>(&self) -> Result<Arc<M>, SessionError> {
        let instance = self.module(M::NAME).await?;
        instance
            .downcast::<M>()
            .ok_or_else(|| SessionError::Instantiation {
                module: M::NAME.to_owned(),
                message: "instance has an unexpected type".into(),
            })
    }

    /// Names of modules bound so far, in binding order.
    pub fn bound_modules(&self) -> Vec<String> {
        self.inner
            .bound
            .lock()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn bound_instance(&self, name: &str) -> Option<Instance> {
        self.inner
            .bound
            .lock()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, instance)| instance.clone())
    }

    async fn bind(&self, name: &str) -> Result<Instance, SessionError> {
        if let Some(found) = self.bound_instance(name) {
            return Ok(found);
        }
        if self.is_finalized() {
            return Err(SessionError::Finalized);
        }

        let env = &self.inner.env;
        let descriptor = env
            .registry()
            .get(name)
            .ok_or_else(|| SessionError::UnknownModule(name.to_owned()))?;
        let instance = match descriptor.lifecycle() {
            Lifecycle::Singleton => {
                env.modules
                    .singleton(name)
                    .ok_or_else(|| SessionError::Instantiation {
                        module: name.to_owned(),
                        message: "singleton is not running".into(),
                    })?
            }
            Lifecycle::PerSession => {
                descriptor
                    .construct(&env.modules)
                    .map_err(|e| SessionError::Instantiation {
                        module: name.to_owned(),
                        message: e.to_string(),
                    })?
            }
        };

        // Bound before the hook runs so a hook may look itself up.
        self.inner
            .bound
            .lock()
            .push((name.to_owned(), instance.clone()));

        if let Err(e) = instance.module().on_start_session(self).await {
            warn!(module = %name, error = %e, "onStartSession failed");
            self.inner.bound.lock().retain(|(n, _)| n != name);
            return Err(SessionError::Instantiation {
                module: name.to_owned(),
                message: e.to_string(),
            });
        }
        debug!(module = %name, lifecycle = %descriptor.lifecycle(), "module bound to session");
        Ok(instance)
    }

    // ── Transport extras ────────────────────────────────────────────────

    /// Raw body of an upload request.
    pub fn upload(&self) -> Option<&Bytes> {
        self.inner.upload.as_ref()
    }

    /// Replace the default JSON response with a custom payload.
    pub fn respond_raw(&self, content_type: impl Into<String>, body: impl Into<Bytes>) {
        self.respond_raw_with_status(200, content_type, body);
    }

    /// [`respond_raw`](Self::respond_raw) with an explicit status code.
    pub fn respond_raw_with_status(
        &self,
        status: u16,
        content_type: impl Into<String>,
        body: impl Into<Bytes>,
    ) {
        *self.inner.custom_response.lock() = Some(RawResponse {
            status,
            content_type: content_type.into(),
            body: body.into(),
        });
    }

    /// Whether a module asked to suppress the default response.
    pub fn suppresses_default_response(&self) -> bool {
        self.inner.custom_response.lock().is_some()
    }

    /// Take the custom payload, if any.
    pub fn take_custom_response(&self) -> Option<RawResponse> {
        self.inner.custom_response.lock().take()
    }

    // ── Teardown ────────────────────────────────────────────────────────

    /// Whether [`finalize`](Self::finalize) has run.
    pub fn is_finalized(&self) -> bool {
        self.inner.finalized.load(Ordering::Acquire)
    }

    /// Run end-of-session hooks on every bound module, then persist the
    /// `TAB` and `GLOBAL` item maps. Only the first call does anything.
    #[instrument(skip(self), fields(global = %self.inner.global_id, tab = %self.inner.tab_id))]
    pub async fn finalize(&self) -> Result<(), SessionError> {
        if self.inner.finalized.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let bound = std::mem::take(&mut *self.inner.bound.lock());
        let results = join_all(bound.iter().map(|(name, instance)| async move {
            (name.as_str(), instance.module().on_end_session(self).await)
        }))
        .await;
        for (name, result) in results {
            if let Err(e) = result {
                warn!(module = %name, error = %e, "onEndSession failed");
            }
        }
        drop(bound);

        let store = self.inner.env.store();
        let tab_items = self.session_items();
        store
            .end_session(SessionKind::Tab, &self.inner.tab_id, &tab_items)
            .await?;
        let global_items = self.global_items();
        store
            .end_session(SessionKind::Global, &self.inner.global_id, &global_items)
            .await?;
        Ok(())
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("global_id", &self.inner.global_id)
            .field("tab_id", &self.inner.tab_id)
            .field("finalized", &self.is_finalized())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
