//! Module descriptors and the boot-time catalog.
//!
//! The catalog is the explicit registration API that replaces load-time
//! self-registration: the binary registers every module type once, then the
//! catalog is frozen into a [`ModuleRegistry`](super::ModuleRegistry).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::host::ModuleContext;
use super::methods::{MethodTable, RemoteMethod, mangle};
use super::{Instance, Lifecycle, ModuleInfo, ModuleType};
use crate::errors::{ModuleError, RegistryError};

type Factory = Arc<dyn Fn(&ModuleContext) -> Result<Instance, ModuleError> + Send + Sync>;

/// Static metadata and constructor of one module type.
#[derive(Clone)]
pub struct ModuleDescriptor {
    name: String,
    info: ModuleInfo,
    dependencies: Vec<String>,
    lifecycle: Lifecycle,
    eager_session: bool,
    factory: Factory,
    methods: Arc<HashMap<String, RemoteMethod>>,
}

impl ModuleDescriptor {
    /// Describe module type `M`.
    pub fn of<M: ModuleType>() -> Self {
        let mut table = MethodTable::<M>::new();
        M::methods(&mut table);

        let mut dependencies: Vec<String> = Vec::new();
        for dep in M::dependencies() {
            if !dependencies.iter().any(|d| d == dep) {
                dependencies.push((*dep).to_owned());
            }
        }

        Self {
            name: M::NAME.to_owned(),
            info: M::info(),
            dependencies,
            lifecycle: M::lifecycle(),
            eager_session: M::eager_session(),
            factory: Arc::new(|ctx: &ModuleContext| M::create(ctx).map(Instance::new)),
            methods: Arc::new(table.into_methods()),
        }
    }

    /// Unique module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descriptive metadata.
    pub fn info(&self) -> &ModuleInfo {
        &self.info
    }

    /// Declared dependencies, in declaration order without repeats.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Lifecycle policy.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Whether every session binds this module up front.
    pub fn eager_session(&self) -> bool {
        self.eager_session
    }

    /// Look up a remote method by its unmangled name.
    pub fn method(&self, name: &str) -> Option<&RemoteMethod> {
        self.methods.get(&mangle(name))
    }

    /// Remote method names (unmangled) with their arity, sorted by name.
    pub fn remote_methods(&self) -> Vec<(&str, usize)> {
        let mut out: Vec<(&str, usize)> = self
            .methods
            .iter()
            .filter_map(|(key, m)| key.strip_prefix(super::REMOTE_PREFIX).map(|n| (n, m.arity())))
            .collect();
        out.sort_unstable();
        out
    }

    /// Build a new instance.
    pub fn construct(&self, ctx: &ModuleContext) -> Result<Instance, ModuleError> {
        (self.factory)(ctx)
    }

    pub(crate) fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        let mut deduped: Vec<String> = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if !deduped.contains(&dep) {
                deduped.push(dep);
            }
        }
        self.dependencies = deduped;
        self
    }

    pub(crate) fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub(crate) fn with_eager_session(mut self, eager: bool) -> Self {
        self.eager_session = eager;
        self
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("lifecycle", &self.lifecycle)
            .field("eager_session", &self.eager_session)
            .field("methods", &self.methods.len())
            .finish_non_exhaustive()
    }
}

/// Every module type compiled into the binary, by name.
#[derive(Debug, Default)]
pub struct ModuleCatalog {
    descriptors: HashMap<String, ModuleDescriptor>,
}

impl ModuleCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register module type `M`.
    pub fn register<M: ModuleType>(&mut self) -> Result<&mut Self, RegistryError> {
        self.insert(ModuleDescriptor::of::<M>())?;
        Ok(self)
    }

    /// Register a prepared descriptor.
    pub fn insert(&mut self, descriptor: ModuleDescriptor) -> Result<(), RegistryError> {
        if self.descriptors.contains_key(descriptor.name()) {
            return Err(RegistryError::DuplicateModule {
                name: descriptor.name().to_owned(),
                first: "module catalog".into(),
                second: "module catalog".into(),
            });
        }
        let _ = self
            .descriptors
            .insert(descriptor.name().to_owned(), descriptor);
        Ok(())
    }

    /// Look up a registered module type.
    pub fn get(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.descriptors.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered module types.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub(crate) fn descriptors(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.descriptors.values()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
