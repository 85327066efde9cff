//! Remote method tables.
//!
//! Each module declares its remotely callable surface in a [`MethodTable`].
//! Entries are stored under a mangled key (`JS_` + method name) so only
//! methods registered for remote use can ever be reached from a request,
//! and every entry carries the arity the dispatcher enforces.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{Instance, ModuleType};
use crate::errors::ModuleError;
use crate::session::SessionContext;

/// Marker prepended to remotely callable method names.
pub const REMOTE_PREFIX: &str = "JS_";

type Handler =
    Arc<dyn Fn(Instance, Call) -> BoxFuture<'static, Result<Value, ModuleError>> + Send + Sync>;

/// Arguments of one remote invocation.
pub struct Call {
    /// The requesting session.
    pub session: SessionContext,
    /// Positional parameters, already arity-checked.
    pub params: Vec<Value>,
}

impl Call {
    /// Decode the parameter at `index`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, ModuleError> {
        let value = self.params.get(index).ok_or_else(|| ModuleError::Argument {
            index,
            message: "missing".into(),
        })?;
        serde_json::from_value(value.clone()).map_err(|e| ModuleError::Argument {
            index,
            message: e.to_string(),
        })
    }
}

/// A type-erased remote method.
#[derive(Clone)]
pub struct RemoteMethod {
    arity: usize,
    handler: Handler,
}

impl RemoteMethod {
    /// Declared parameter count.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Run the method against `instance`.
    pub fn invoke(&self, instance: Instance, call: Call) -> BoxFuture<'static, Result<Value, ModuleError>> {
        (self.handler)(instance, call)
    }
}

impl fmt::Debug for RemoteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteMethod")
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Builder for a module's remote surface.
pub struct MethodTable<M> {
    entries: HashMap<String, RemoteMethod>,
    _module: PhantomData<fn() -> M>,
}

impl<M: ModuleType> MethodTable<M> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            _module: PhantomData,
        }
    }

    /// Register `name` taking exactly `arity` positional parameters.
    ///
    /// Registering the same name twice replaces the earlier entry.
    pub fn register<F, Fut, R>(&mut self, name: &str, arity: usize, f: F) -> &mut Self
    where
        F: Fn(Arc<M>, Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ModuleError>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        let f = Arc::new(f);
        let handler: Handler = Arc::new(move |instance: Instance, call: Call| {
            let f = Arc::clone(&f);
            async move {
                let this = instance.downcast::<M>().ok_or_else(|| {
                    ModuleError::Unavailable(format!("instance is not a {}", M::NAME))
                })?;
                let value = (*f)(this, call).await?;
                serde_json::to_value(value).map_err(|e| ModuleError::Execution(e.to_string()))
            }
            .boxed()
        });
        let _ = self
            .entries
            .insert(mangle(name), RemoteMethod { arity, handler });
        self
    }

    pub(crate) fn into_methods(self) -> HashMap<String, RemoteMethod> {
        self.entries
    }
}

/// The table key for a method segment.
pub fn mangle(method: &str) -> String {
    format!("{REMOTE_PREFIX}{method}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
