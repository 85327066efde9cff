//! # amf-runtime
//!
//! The session-scoped dispatch engine.
//!
//! - [`modules`]: module model, method tables, discovery, dependency tiers,
//!   [`ModuleRegistry`] and the singleton [`ModuleHost`]
//! - [`session`]: per-request [`SessionContext`] over the two session tiers
//! - [`dispatch`]: the [`Dispatcher`] executing a batch of `Class.method` calls
//!
//! Boot order: register module types in a [`ModuleCatalog`], freeze it into a
//! [`ModuleRegistry`] (optionally through manifest discovery), boot a
//! [`ModuleHost`], then build a [`Dispatcher`] from the host.

#![deny(unsafe_code)]

pub mod dispatch;
pub mod errors;
pub mod modules;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use dispatch::{
    AdapterRequest, AdapterResponse, CallDescriptor, CallError, CallResult, DispatchOutcome,
    Dispatcher,
};
pub use errors::{DispatchError, LifecycleError, ModuleError, RegistryError, SessionError};
pub use modules::{
    Call, Extensions, Instance, Lifecycle, MethodTable, Module, ModuleCatalog, ModuleContext,
    ModuleDescriptor, ModuleHost, ModuleInfo, ModuleRegistry, ModuleState, ModuleType,
};
pub use session::{RawResponse, SessionContext, SessionEnv, SessionHooks, SessionTtls};
