//! Session start hooks.
//!
//! Hooks are registered once during boot and frozen behind an `Arc`; they
//! run concurrently in every [`SessionContext::init`](super::SessionContext::init).

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use super::SessionContext;
use crate::errors::ModuleError;

type Hook = Arc<dyn Fn(SessionContext) -> BoxFuture<'static, Result<(), ModuleError>> + Send + Sync>;

/// Registered "on session start" hooks.
#[derive(Clone, Default)]
pub struct SessionHooks {
    hooks: Vec<(String, Hook)>,
}

impl SessionHooks {
    /// Create an empty hook list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook under `name` (used in logs).
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ModuleError>> + Send + 'static,
    {
        let hook: Hook = Arc::new(move |session| f(session).boxed());
        self.hooks.push((name.into(), hook));
        self
    }

    /// Number of hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hook is registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Registered hook names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.hooks.iter().map(|(name, _)| name.as_str())
    }

    pub(crate) fn run_all(
        &self,
        session: &SessionContext,
    ) -> Vec<(String, BoxFuture<'static, Result<(), ModuleError>>)> {
        self.hooks
            .iter()
            .map(|(name, hook)| (name.clone(), hook(session.clone())))
            .collect()
    }
}

impl fmt::Debug for SessionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|(name, _)| name))
            .finish()
    }
}
