//! Error types for the dispatch engine.
//!
//! The taxonomy follows the blast radius of each failure:
//!
//! - [`RegistryError`] and [`LifecycleError`] are boot errors; the process
//!   must not serve requests after one.
//! - [`SessionError`] and [`DispatchError`] fail a single request.
//! - [`ModuleError`] is what module code returns; the dispatcher confines it
//!   to one call result.

use std::path::PathBuf;

use amf_store::StoreError;
use thiserror::Error;

/// Error returned by module code (hooks, constructors, remote methods).
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The module failed while doing its work.
    #[error("{0}")]
    Execution(String),

    /// A positional argument could not be decoded.
    #[error("argument {index}: {message}")]
    Argument {
        /// Zero-based parameter position.
        index: usize,
        /// Decoder message.
        message: String,
    },

    /// A resource the module relies on is unavailable.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Session store failure surfaced through module code.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ModuleError {
    /// Shorthand for [`ModuleError::Execution`].
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }
}

/// Errors raised while discovering modules or ordering them.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The module directory could not be walked or a manifest read.
    #[error("module discovery failed at {}: {message}", path.display())]
    Discovery {
        /// Offending path.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// A manifest was not valid.
    #[error("invalid module manifest {}: {message}", path.display())]
    Manifest {
        /// Manifest file.
        path: PathBuf,
        /// Parse or validation message.
        message: String,
    },

    /// Two registrations or manifests declare the same module name.
    #[error("duplicate module '{name}' declared in {first} and {second}")]
    DuplicateModule {
        /// Module name.
        name: String,
        /// Where it was first declared.
        first: String,
        /// Where it was declared again.
        second: String,
    },

    /// A manifest names a module type that was never registered.
    #[error("unknown module type '{name}' in {}", path.display())]
    UnknownModule {
        /// Module name.
        name: String,
        /// Manifest file.
        path: PathBuf,
    },

    /// The dependency graph contains a cycle.
    #[error("module dependency cycle: {path}")]
    Cycle {
        /// The cycle, e.g. `A -> B -> A`.
        path: String,
    },
}

/// Errors raised by the singleton lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A module could not be constructed or its create hook failed.
    #[error("module '{module}' failed to start: {source}")]
    Create {
        /// Module name.
        module: String,
        /// Underlying failure.
        #[source]
        source: ModuleError,
    },

    /// `boot` was called on a host that already booted or shut down.
    #[error("module host cannot boot from state {0}")]
    InvalidState(&'static str),
}

/// Errors raised by a [`SessionContext`](crate::session::SessionContext).
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session store failed.
    #[error("session store error: {0}")]
    Store(#[from] StoreError),

    /// No module with that name is registered.
    #[error("unknown module '{0}'")]
    UnknownModule(String),

    /// The module exists but could not be made available to this session.
    #[error("module '{module}' unavailable in session: {message}")]
    Instantiation {
        /// Module name.
        module: String,
        /// What went wrong.
        message: String,
    },

    /// The session was already finalized.
    #[error("session already finalized")]
    Finalized,
}

/// Request-level failure of a dispatch; the whole request fails.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Opening or closing the session failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The task running the batch panicked or was aborted.
    #[error("batch task failed: {0}")]
    Task(String),
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        Self::Session(SessionError::Store(err))
    }
}

/// Result type for registry operations.
pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
