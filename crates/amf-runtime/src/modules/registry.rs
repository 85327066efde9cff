//! The frozen module registry.
//!
//! Built once at boot from a [`ModuleCatalog`], directly or through manifest
//! discovery. Construction computes the dependency tiers, so a registry that
//! exists is known to be acyclic. Lookups never trigger discovery.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use tracing::warn;

use super::catalog::{ModuleCatalog, ModuleDescriptor};
use super::{ModuleType, discovery, order};
use crate::errors::RegistryError;

/// Read-only table of every module the process serves.
#[derive(Debug)]
pub struct ModuleRegistry {
    descriptors: BTreeMap<String, ModuleDescriptor>,
    tiers: Vec<Vec<String>>,
}

impl ModuleRegistry {
    /// Freeze a set of descriptors, failing on a dependency cycle.
    pub fn new(descriptors: BTreeMap<String, ModuleDescriptor>) -> Result<Self, RegistryError> {
        let graph: BTreeMap<String, Vec<String>> = descriptors
            .iter()
            .map(|(name, d)| (name.clone(), d.dependencies().to_vec()))
            .collect();

        for (name, deps) in &graph {
            for dep in deps.iter().filter(|d| !graph.contains_key(*d)) {
                warn!(module = %name, dependency = %dep, "dependency is not a registered module, ignoring");
            }
        }

        let tiers = order::tiers(&graph)?;
        Ok(Self { descriptors, tiers })
    }

    /// Serve every module type in the catalog.
    pub fn from_catalog(catalog: &ModuleCatalog) -> Result<Self, RegistryError> {
        let descriptors = catalog
            .descriptors()
            .map(|d| (d.name().to_owned(), d.clone()))
            .collect();
        Self::new(descriptors)
    }

    /// Serve the modules listed by the manifests under `dir`.
    pub fn discover(dir: &Path, catalog: &ModuleCatalog) -> Result<Self, RegistryError> {
        Self::new(discovery::discover(dir, catalog)?)
    }

    /// Look up a module by name.
    pub fn get(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.descriptors.get(name)
    }

    /// Look up a module by type.
    pub fn get_type<M: ModuleType>(&self) -> Option<&ModuleDescriptor> {
        self.get(M::NAME)
    }

    /// Initialization tiers, lowest priority first.
    pub fn tiers(&self) -> &[Vec<String>] {
        &self.tiers
    }

    /// Module names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    /// Descriptors, sorted by name.
    pub fn descriptors(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.descriptors.values()
    }

    /// Modules every session binds before running calls, in tier order.
    pub fn eager_modules(&self) -> Vec<&str> {
        self.tiers
            .iter()
            .flatten()
            .filter(|name| self.descriptors[name.as_str()].eager_session())
            .map(String::as_str)
            .collect()
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// `name` and everything it transitively depends on, dependencies first.
    ///
    /// Dependencies that are not registered are skipped.
    pub fn dependency_closure(&self, name: &str) -> Result<Vec<String>, RegistryError> {
        if !self.descriptors.contains_key(name) {
            return Err(RegistryError::UnknownModule {
                name: name.to_owned(),
                path: "registry".into(),
            });
        }
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        self.visit(name, &mut seen, &mut out);
        Ok(out)
    }

    // Acyclicity was checked in `new`, so plain DFS terminates.
    fn visit(&self, name: &str, seen: &mut HashSet<String>, out: &mut Vec<String>) {
        let Some(descriptor) = self.descriptors.get(name) else {
            return;
        };
        if !seen.insert(name.to_owned()) {
            return;
        }
        for dep in descriptor.dependencies() {
            self.visit(dep, seen, out);
        }
        out.push(name.to_owned());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
