//! Extra `?cmd=` handlers registered by the application.
//!
//! `exec` and `upload` are built in and cannot be replaced. Every other
//! name is looked up here before the request is answered with
//! "request error".

use std::collections::HashMap;
use std::sync::Arc;

use amf_runtime::Dispatcher;
use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;
use tracing::warn;

/// Commands the call endpoint always handles itself.
pub const BUILTIN_COMMANDS: [&str; 2] = ["exec", "upload"];

/// What a command handler can reach besides the request.
#[derive(Clone, Debug)]
pub struct CommandContext {
    /// The batch executor, and through it the booted modules.
    pub dispatcher: Arc<Dispatcher>,
}

/// A `?cmd=<name>` handler.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Answer one request.
    async fn handle(&self, request: Request, ctx: &CommandContext) -> Response;
}

/// Command names mapped to handlers. Frozen into the router once built.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any earlier one.
    ///
    /// Built-in names are ignored.
    pub fn register(&mut self, name: &str, handler: impl CommandHandler + 'static) -> &mut Self {
        if BUILTIN_COMMANDS.contains(&name) {
            warn!(cmd = %name, "built-in command cannot be replaced");
            return self;
        }
        let _ = self.handlers.insert(name.to_owned(), Arc::new(handler));
        self
    }

    /// The handler for `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered names (sorted).
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether no commands are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("names", &self.names())
            .finish()
    }
}
