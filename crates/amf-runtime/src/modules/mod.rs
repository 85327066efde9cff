//! Module model.
//!
//! A module is a server object whose remotely callable methods are exposed
//! to the browser as `Class.method`. Rust has no runtime reflection, so each
//! module type declares its surface explicitly:
//!
//! - [`Module`]: lifecycle hooks (all optional)
//! - [`ModuleType`]: name, metadata, dependencies, [`Lifecycle`] policy,
//!   constructor and [`MethodTable`]
//!
//! Module types are registered in a [`ModuleCatalog`] at boot and frozen into
//! a [`ModuleRegistry`]; the [`ModuleHost`] then runs the singleton lifecycle.

pub mod catalog;
pub mod discovery;
pub mod host;
pub mod methods;
pub mod order;
pub mod registry;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use catalog::{ModuleCatalog, ModuleDescriptor};
pub use host::{Extensions, ModuleContext, ModuleHost, ModuleState};
pub use methods::{Call, MethodTable, REMOTE_PREFIX, RemoteMethod};
pub use registry::ModuleRegistry;

use crate::errors::ModuleError;
use crate::session::SessionContext;

/// Lifecycle hooks shared by every module.
///
/// Singleton hooks (`on_create_module`, `on_destroy_module`) run once per
/// process on the process-wide instance. Session hooks run on whichever
/// instance a session binds: the singleton, or a fresh per-session instance.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    /// Called once after construction during boot. Failure aborts boot.
    async fn on_create_module(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Called once at shutdown, dependents first.
    async fn on_destroy_module(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Called when a session first binds this module.
    async fn on_start_session(&self, _session: &SessionContext) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Called when a session that bound this module finalizes.
    async fn on_end_session(&self, _session: &SessionContext) -> Result<(), ModuleError> {
        Ok(())
    }
}

/// Static description of a module type.
///
/// Implementing this trait is what makes a type a module; discovery only
/// accepts names that belong to a registered `ModuleType`.
pub trait ModuleType: Module + Sized {
    /// Unique name, the `Class` part of `Class.method`.
    const NAME: &'static str;

    /// Descriptive metadata.
    fn info() -> ModuleInfo {
        ModuleInfo::default()
    }

    /// Names of modules that must initialize before this one.
    fn dependencies() -> &'static [&'static str] {
        &[]
    }

    /// Whether sessions share the singleton or get their own instance.
    fn lifecycle() -> Lifecycle {
        Lifecycle::Singleton
    }

    /// Bind this module in every session, before the first call runs.
    fn eager_session() -> bool {
        false
    }

    /// Build an instance. Called once at boot, and once per session for
    /// [`Lifecycle::PerSession`] modules.
    fn create(ctx: &ModuleContext) -> Result<Self, ModuleError>;

    /// Declare the remotely callable methods.
    fn methods(table: &mut MethodTable<Self>);
}

/// Descriptive module metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Module version.
    pub version: u32,
    /// Author.
    pub author: String,
    /// Free-form description.
    pub description: String,
}

/// How sessions obtain a module instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Lifecycle {
    /// Every session binds the process-wide instance.
    #[default]
    Singleton,
    /// Every session constructs its own instance.
    PerSession,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Singleton => "singleton",
            Self::PerSession => "perSession",
        })
    }
}

/// A live module object, type-erased.
#[derive(Clone)]
pub struct Instance {
    module: Arc<dyn Module>,
    any: Arc<dyn Any + Send + Sync>,
}

impl Instance {
    /// Wrap a constructed module.
    pub fn new<M: ModuleType>(module: M) -> Self {
        let module = Arc::new(module);
        Self {
            module: module.clone(),
            any: module,
        }
    }

    /// Lifecycle hooks of the instance.
    pub fn module(&self) -> &dyn Module {
        self.module.as_ref()
    }

    /// Recover the concrete module type.
    pub fn downcast<M: ModuleType>(&self) -> Option<Arc<M>> {
        self.any.clone().downcast::<M>().ok()
    }

    /// Whether two handles refer to the same object.
    pub fn same_as(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.any, &other.any)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance").finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Foo, Other};

    #[test]
    fn downcast_to_own_type() {
        let instance = Instance::new(Foo::default());
        assert!(instance.downcast::<Foo>().is_some());
        assert!(instance.downcast::<Other>().is_none());
    }

    #[test]
    fn clones_share_the_object() {
        let a = Instance::new(Foo::default());
        let b = a.clone();
        let c = Instance::new(Foo::default());
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
    }

    #[test]
    fn lifecycle_serde_names() {
        let v: Lifecycle = serde_json::from_str("\"perSession\"").unwrap();
        assert_eq!(v, Lifecycle::PerSession);
        assert_eq!(Lifecycle::Singleton.to_string(), "singleton");
    }
}
