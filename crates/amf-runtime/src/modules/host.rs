//! Singleton lifecycle.
//!
//! Per module: `Unconstructed -> Constructed -> Creating -> Initialized -> Destroying -> Destroyed`.
//!
//! Only modules whose `on_create_module` was called are ever destroyed.
//!
//! [`ModuleHost::boot`] constructs tier by tier; every module of a tier runs
//! `on_create_module` concurrently and the tier is awaited before the next
//! one starts. Any failure tears down what was already built and fails boot.
//! [`ModuleHost::shutdown`] walks the tiers in reverse, destroying each tier
//! concurrently; destroy failures are logged and never stop the walk.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use amf_settings::AmfSettings;
use amf_store::SessionStore;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument};

use super::registry::ModuleRegistry;
use super::{Instance, ModuleType};
use crate::errors::LifecycleError;

/// Lifecycle state of one singleton.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModuleState {
    /// Not built yet.
    Unconstructed,
    /// Built; `on_create_module` not called yet.
    Constructed,
    /// `on_create_module` called; running or failed.
    Creating,
    /// `on_create_module` succeeded; serving.
    Initialized,
    /// `on_destroy_module` running.
    Destroying,
    /// Torn down.
    Destroyed,
}

impl ModuleState {
    fn needs_destroy(self) -> bool {
        matches!(self, Self::Creating | Self::Initialized)
    }
}

/// Host-wide phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Booting,
    Running,
    Stopped,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Booting => "booting",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

/// Typed map of shared resources handed to modules.
#[derive(Clone, Default)]
pub struct Extensions {
    map: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Store `value`, replacing any earlier value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: Arc<T>) {
        let _ = self.map.insert(TypeId::of::<T>(), value);
    }

    /// Fetch the value of type `T`.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|v| v.clone().downcast::<T>().ok())
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

struct ContextInner {
    settings: Arc<AmfSettings>,
    store: Arc<dyn SessionStore>,
    registry: Arc<ModuleRegistry>,
    extensions: Extensions,
    singletons: RwLock<HashMap<String, Instance>>,
}

/// Process-wide services a module can reach.
///
/// Held by modules for configuration, store access and singleton lookup.
/// It never refers to a request session.
#[derive(Clone)]
pub struct ModuleContext {
    inner: Arc<ContextInner>,
}

impl ModuleContext {
    /// Loaded settings.
    pub fn settings(&self) -> &AmfSettings {
        &self.inner.settings
    }

    /// The session store.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.inner.store
    }

    /// The module registry.
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.inner.registry
    }

    /// A shared resource registered on the host.
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner.extensions.get::<T>()
    }

    /// The live singleton named `name`.
    pub fn singleton(&self, name: &str) -> Option<Instance> {
        self.inner.singletons.read().get(name).cloned()
    }

    /// The live singleton of type `M`.
    pub fn module<M: ModuleType>(&self) -> Option<Arc<M>> {
        self.singleton(M::NAME)?.downcast::<M>()
    }

    fn put_singleton(&self, name: &str, instance: Instance) {
        let _ = self
            .inner
            .singletons
            .write()
            .insert(name.to_owned(), instance);
    }

    fn clear_singletons(&self) {
        self.inner.singletons.write().clear();
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("modules", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

/// Owns the singleton instances and drives their lifecycle.
pub struct ModuleHost {
    context: ModuleContext,
    states: Mutex<HashMap<String, ModuleState>>,
    phase: Mutex<Phase>,
}

impl ModuleHost {
    /// Create a host over `registry`.
    pub fn new(
        registry: Arc<ModuleRegistry>,
        settings: Arc<AmfSettings>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self::with_extensions(registry, settings, store, Extensions::default())
    }

    /// Create a host whose modules can reach `extensions`.
    pub fn with_extensions(
        registry: Arc<ModuleRegistry>,
        settings: Arc<AmfSettings>,
        store: Arc<dyn SessionStore>,
        extensions: Extensions,
    ) -> Self {
        let states = registry
            .names()
            .map(|n| (n.to_owned(), ModuleState::Unconstructed))
            .collect();
        Self {
            context: ModuleContext {
                inner: Arc::new(ContextInner {
                    settings,
                    store,
                    registry,
                    extensions,
                    singletons: RwLock::new(HashMap::new()),
                }),
            },
            states: Mutex::new(states),
            phase: Mutex::new(Phase::Idle),
        }
    }

    /// The context handed to modules.
    pub fn context(&self) -> &ModuleContext {
        &self.context
    }

    /// The registry being served.
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        self.context.registry()
    }

    /// Current state of `name` (`None` if it is not registered).
    pub fn state(&self, name: &str) -> Option<ModuleState> {
        self.states.lock().get(name).copied()
    }

    /// Whether boot completed and shutdown has not started.
    pub fn is_running(&self) -> bool {
        *self.phase.lock() == Phase::Running
    }

    /// Construct and initialize every singleton in tier order.
    #[instrument(skip(self))]
    pub async fn boot(&self) -> Result<(), LifecycleError> {
        {
            let mut phase = self.phase.lock();
            if *phase != Phase::Idle {
                return Err(LifecycleError::InvalidState(phase.as_str()));
            }
            *phase = Phase::Booting;
        }

        let registry = Arc::clone(self.registry());
        for (index, tier) in registry.tiers().iter().enumerate() {
            debug!(tier = index + 1, modules = ?tier, "initializing tier");

            let mut built = Vec::with_capacity(tier.len());
            for name in tier {
                let Some(descriptor) = registry.get(name) else {
                    continue;
                };
                match descriptor.construct(&self.context) {
                    Ok(instance) => {
                        self.context.put_singleton(name, instance.clone());
                        self.set_state(name, ModuleState::Constructed);
                        built.push((name.as_str(), instance));
                    }
                    Err(source) => {
                        error!(module = %name, error = %source, "module construction failed");
                        self.teardown().await;
                        return Err(LifecycleError::Create {
                            module: name.clone(),
                            source,
                        });
                    }
                }
            }

            for (name, _) in &built {
                self.set_state(name, ModuleState::Creating);
            }
            let results = join_all(built.iter().map(|(name, instance)| async move {
                (*name, instance.module().on_create_module().await)
            }))
            .await;

            let mut failure = None;
            for (name, result) in results {
                match result {
                    Ok(()) => self.set_state(name, ModuleState::Initialized),
                    Err(source) => {
                        error!(module = %name, error = %source, "onCreateModule failed");
                        if failure.is_none() {
                            failure = Some(LifecycleError::Create {
                                module: name.to_owned(),
                                source,
                            });
                        }
                    }
                }
            }
            if let Some(err) = failure {
                self.teardown().await;
                return Err(err);
            }
        }

        *self.phase.lock() = Phase::Running;
        info!(modules = registry.len(), tiers = registry.tiers().len(), "modules initialized");
        Ok(())
    }

    /// Destroy every constructed singleton in reverse tier order.
    ///
    /// Safe to call more than once; later calls do nothing.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        {
            let mut phase = self.phase.lock();
            if *phase == Phase::Stopped {
                return;
            }
            *phase = Phase::Stopped;
        }
        self.teardown().await;
        info!("modules destroyed");
    }

    async fn teardown(&self) {
        *self.phase.lock() = Phase::Stopped;
        let registry = Arc::clone(self.registry());

        for tier in registry.tiers().iter().rev() {
            let targets: Vec<(&str, Instance)> = tier
                .iter()
                .filter(|name| self.state(name).is_some_and(ModuleState::needs_destroy))
                .filter_map(|name| {
                    self.context
                        .singleton(name)
                        .map(|instance| (name.as_str(), instance))
                })
                .collect();
            if targets.is_empty() {
                continue;
            }

            for (name, _) in &targets {
                self.set_state(name, ModuleState::Destroying);
            }
            let results = join_all(targets.iter().map(|(name, instance)| async move {
                (*name, instance.module().on_destroy_module().await)
            }))
            .await;

            for (name, result) in results {
                if let Err(e) = result {
                    error!(module = %name, error = %e, "onDestroyModule failed");
                }
                self.set_state(name, ModuleState::Destroyed);
            }
        }

        self.context.clear_singletons();
    }

    fn set_state(&self, name: &str, state: ModuleState) {
        let _ = self.states.lock().insert(name.to_owned(), state);
    }
}

impl fmt::Debug for ModuleHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHost")
            .field("phase", &*self.phase.lock())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
