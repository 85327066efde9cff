//! Module types and fixtures shared by the unit tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use amf_core::{SessionId, SessionKind};
use amf_settings::AmfSettings;
use amf_store::{Items, SessionStore, SqliteSessionStore, StartedSession, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;

use crate::errors::ModuleError;
use crate::modules::{
    Call, Extensions, Lifecycle, MethodTable, Module, ModuleCatalog, ModuleContext, ModuleHost, ModuleInfo,
    ModuleRegistry, ModuleType,
};
use crate::session::{SessionContext, SessionEnv, SessionHooks, SessionTtls};

/// Ordered record of lifecycle events, with injectable failures.
#[derive(Default)]
pub(crate) struct EventLog {
    events: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl EventLog {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record `event`, failing if it was marked with [`fail_on`](Self::fail_on).
    pub(crate) fn record(&self, event: String) -> Result<(), ModuleError> {
        let fail = self.failing.lock().contains(&event);
        self.events.lock().push(event.clone());
        if fail {
            return Err(ModuleError::execution(format!("{event} failed")));
        }
        Ok(())
    }

    pub(crate) fn fail_on(&self, event: &str) {
        let _ = self.failing.lock().insert(event.to_owned());
    }

    pub(crate) fn matching(&self, prefix: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub(crate) fn contains(&self, event: &str) -> bool {
        self.events.lock().iter().any(|e| e == event)
    }
}

fn record(log: Option<&Arc<EventLog>>, event: String) -> Result<(), ModuleError> {
    log.map_or(Ok(()), |log| log.record(event))
}

// ── Foo ─────────────────────────────────────────────────────────────────────

/// General-purpose singleton with one method per dispatch scenario.
#[derive(Default)]
pub(crate) struct Foo {
    log: Option<Arc<EventLog>>,
}

impl Foo {
    pub(crate) fn add_ints(&self, a: i64, b: i64) -> i64 {
        a + b
    }
}

async fn explode() -> Result<(), ModuleError> {
    panic!("boom")
}

#[async_trait]
impl Module for Foo {
    async fn on_start_session(&self, _session: &SessionContext) -> Result<(), ModuleError> {
        record(self.log.as_ref(), "start:Foo".into())
    }

    async fn on_end_session(&self, _session: &SessionContext) -> Result<(), ModuleError> {
        record(self.log.as_ref(), "end:Foo".into())
    }
}

impl ModuleType for Foo {
    const NAME: &'static str = "Foo";

    fn info() -> ModuleInfo {
        ModuleInfo {
            version: 1,
            author: "tests".into(),
            description: "dispatch fixtures".into(),
        }
    }

    fn create(ctx: &ModuleContext) -> Result<Self, ModuleError> {
        Ok(Self {
            log: ctx.extension::<EventLog>(),
        })
    }

    fn methods(table: &mut MethodTable<Self>) {
        let _ = table
            .register("add", 2, |this, call: Call| async move {
                Ok::<_, ModuleError>(this.add_ints(call.arg(0)?, call.arg(1)?))
            })
            .register("fail", 0, |_this, _call| async move {
                Err::<(), _>(ModuleError::execution("failed on purpose"))
            })
            .register("boom", 0, |_this, _call| explode())
            .register("echo", 1, |_this, call: Call| async move { call.arg::<Value>(0) })
            .register("remember", 2, |_this, call: Call| async move {
                let key: String = call.arg(0)?;
                call.session.set_session_item(key, call.arg::<Value>(1)?);
                Ok::<_, ModuleError>(())
            })
            .register("recall", 1, |_this, call: Call| async move {
                let key: String = call.arg(0)?;
                Ok::<_, ModuleError>(call.session.session_item(&key).unwrap_or(Value::Null))
            })
            .register("raw", 1, |_this, call: Call| async move {
                let text: String = call.arg(0)?;
                call.session.respond_raw("text/plain", text);
                Ok::<_, ModuleError>(())
            })
            .register("uploadLen", 0, |_this, call: Call| async move {
                Ok::<_, ModuleError>(call.session.upload().map_or(0, Bytes::len))
            })
            .register("slow", 1, |_this, call: Call| async move {
                tokio::time::sleep(Duration::from_millis(call.arg(0)?)).await;
                Ok::<_, ModuleError>(())
            });
    }
}

// ── Other ───────────────────────────────────────────────────────────────────

/// A module with no remote surface.
pub(crate) struct Other;

impl Module for Other {}

impl ModuleType for Other {
    const NAME: &'static str = "Other";

    fn create(_ctx: &ModuleContext) -> Result<Self, ModuleError> {
        Ok(Self)
    }

    fn methods(_table: &mut MethodTable<Self>) {}
}

// ── Broken ──────────────────────────────────────────────────────────────────

/// A module whose constructor always fails.
pub(crate) struct Broken;

impl Module for Broken {}

impl ModuleType for Broken {
    const NAME: &'static str = "Broken";

    fn create(_ctx: &ModuleContext) -> Result<Self, ModuleError> {
        Err(ModuleError::Unavailable("broken on purpose".into()))
    }

    fn methods(_table: &mut MethodTable<Self>) {}
}

// ── Scoped ──────────────────────────────────────────────────────────────────

/// Per-session counter.
#[derive(Default)]
pub(crate) struct Scoped {
    count: AtomicU64,
}

impl Scoped {
    pub(crate) fn bump(&self) -> u64 {
        self.count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Module for Scoped {}

impl ModuleType for Scoped {
    const NAME: &'static str = "Scoped";

    fn lifecycle() -> Lifecycle {
        Lifecycle::PerSession
    }

    fn create(_ctx: &ModuleContext) -> Result<Self, ModuleError> {
        Ok(Self::default())
    }

    fn methods(table: &mut MethodTable<Self>) {
        let _ = table.register("bump", 0, |this, _call| async move {
            Ok::<_, ModuleError>(this.bump())
        });
    }
}

// ── A <- B <- C ─────────────────────────────────────────────────────────────

macro_rules! chain_module {
    ($ty:ident, $name:literal, [$($dep:literal),*]) => {
        pub(crate) struct $ty {
            log: Option<Arc<EventLog>>,
        }

        #[async_trait]
        impl Module for $ty {
            async fn on_create_module(&self) -> Result<(), ModuleError> {
                record(self.log.as_ref(), concat!("create:", $name).into())
            }

            async fn on_destroy_module(&self) -> Result<(), ModuleError> {
                record(self.log.as_ref(), concat!("destroy:", $name).into())
            }

            async fn on_start_session(&self, _session: &SessionContext) -> Result<(), ModuleError> {
                record(self.log.as_ref(), concat!("start:", $name).into())
            }

            async fn on_end_session(&self, _session: &SessionContext) -> Result<(), ModuleError> {
                record(self.log.as_ref(), concat!("end:", $name).into())
            }
        }

        impl ModuleType for $ty {
            const NAME: &'static str = $name;

            fn dependencies() -> &'static [&'static str] {
                &[$($dep),*]
            }

            fn create(ctx: &ModuleContext) -> Result<Self, ModuleError> {
                Ok(Self {
                    log: ctx.extension::<EventLog>(),
                })
            }

            fn methods(table: &mut MethodTable<Self>) {
                let _ = table.register("ping", 0, |_this, _call| async move {
                    Ok::<_, ModuleError>($name)
                });
            }
        }
    };
}

chain_module!(ModA, "A", []);
chain_module!(ModB, "B", ["A"]);
chain_module!(ModC, "C", ["B"]);

// ── Stores ──────────────────────────────────────────────────────────────────

/// A store whose backend is unreachable.
pub(crate) struct DownStore;

#[async_trait]
impl SessionStore for DownStore {
    async fn start_session(
        &self,
        _kind: SessionKind,
        _id: Option<&SessionId>,
        _ttl: Duration,
    ) -> amf_store::Result<StartedSession> {
        Err(StoreError::Unavailable("store offline".into()))
    }

    async fn end_session(
        &self,
        _kind: SessionKind,
        _id: &SessionId,
        _items: &Items,
    ) -> amf_store::Result<()> {
        Err(StoreError::Unavailable("store offline".into()))
    }
}

fn memory_store() -> Arc<dyn SessionStore> {
    Arc::new(SqliteSessionStore::in_memory().expect("in-memory store"))
}

// ── Fixtures ────────────────────────────────────────────────────────────────

/// Every test module type.
pub(crate) fn test_catalog() -> ModuleCatalog {
    let mut catalog = ModuleCatalog::new();
    let _ = catalog
        .register::<Foo>()
        .and_then(|c| c.register::<Other>())
        .and_then(|c| c.register::<Scoped>())
        .and_then(|c| c.register::<ModA>())
        .and_then(|c| c.register::<ModB>())
        .and_then(|c| c.register::<ModC>())
        .expect("test catalog");
    catalog
}

fn host_with(
    registry: ModuleRegistry,
    log: &Arc<EventLog>,
    store: Arc<dyn SessionStore>,
) -> ModuleHost {
    let mut extensions = Extensions::default();
    extensions.insert(Arc::clone(log));
    ModuleHost::with_extensions(
        Arc::new(registry),
        Arc::new(AmfSettings::default()),
        store,
        extensions,
    )
}

/// An unbooted host over `catalog` with an in-memory store.
pub(crate) fn host_for(catalog: &ModuleCatalog, log: &Arc<EventLog>) -> ModuleHost {
    let registry = ModuleRegistry::from_catalog(catalog).expect("registry");
    host_with(registry, log, memory_store())
}

async fn boot(
    registry: ModuleRegistry,
    store: Arc<dyn SessionStore>,
    hooks: SessionHooks,
) -> (SessionEnv, Arc<EventLog>) {
    let log = EventLog::new();
    let host = host_with(registry, &log, store);
    host.boot().await.expect("boot");
    (SessionEnv::new(&host, hooks, SessionTtls::default()), log)
}

/// Booted test catalog over an in-memory store.
pub(crate) async fn booted_env() -> (SessionEnv, Arc<EventLog>) {
    booted_env_with_hooks(SessionHooks::new()).await
}

pub(crate) async fn booted_env_with_hooks(hooks: SessionHooks) -> (SessionEnv, Arc<EventLog>) {
    let registry = ModuleRegistry::from_catalog(&test_catalog()).expect("registry");
    boot(registry, memory_store(), hooks).await
}

pub(crate) async fn env_for_registry(registry: ModuleRegistry) -> (SessionEnv, Arc<EventLog>) {
    boot(registry, memory_store(), SessionHooks::new()).await
}

pub(crate) async fn env_with_store(store: Arc<dyn SessionStore>) -> (SessionEnv, Arc<EventLog>) {
    let registry = ModuleRegistry::from_catalog(&test_catalog()).expect("registry");
    boot(registry, store, SessionHooks::new()).await
}

/// A fresh session over the booted test catalog.
pub(crate) async fn session_with() -> (SessionEnv, SessionContext) {
    let (env, _log) = booted_env().await;
    let session = SessionContext::init(&env, None, None, None)
        .await
        .expect("session");
    (env, session)
}
