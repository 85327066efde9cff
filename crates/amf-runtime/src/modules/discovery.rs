//! Manifest-driven module discovery.
//!
//! The module directory is walked recursively for `*.module.json` files.
//! Each manifest lists module names, optionally overriding the compiled
//! dependencies, lifecycle or eager-session flag:
//!
//! ```json
//! { "modules": ["TestModule", { "name": "Counter", "lifecycle": "perSession" }] }
//! ```
//!
//! A listed name must belong to a type registered in the [`ModuleCatalog`];
//! that registration is the nominal "is a module" marker. A name listed
//! twice anywhere in the tree is a startup error.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::catalog::{ModuleCatalog, ModuleDescriptor};
use super::Lifecycle;
use crate::errors::RegistryError;

/// File name suffix of a module manifest.
pub const MANIFEST_SUFFIX: &str = ".module.json";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    modules: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestEntry {
    Name(String),
    Spec(ModuleSpec),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ModuleSpec {
    name: String,
    #[serde(default)]
    dependencies: Option<Vec<String>>,
    #[serde(default)]
    lifecycle: Option<Lifecycle>,
    #[serde(default)]
    eager_session: Option<bool>,
}

impl ManifestEntry {
    fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Spec(spec) => &spec.name,
        }
    }
}

/// Walk `dir` and resolve every listed module against `catalog`.
pub fn discover(
    dir: &Path,
    catalog: &ModuleCatalog,
) -> Result<BTreeMap<String, ModuleDescriptor>, RegistryError> {
    if !dir.is_dir() {
        return Err(RegistryError::Discovery {
            path: dir.to_path_buf(),
            message: "module directory does not exist".into(),
        });
    }

    let mut found: BTreeMap<String, ModuleDescriptor> = BTreeMap::new();
    let mut origin: HashMap<String, PathBuf> = HashMap::new();

    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| RegistryError::Discovery {
            path: e.path().map_or_else(|| dir.to_path_buf(), Path::to_path_buf),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() || !is_manifest(entry.path()) {
            continue;
        }

        let path = entry.path();
        debug!(path = %path.display(), "reading module manifest");
        for listed in read_manifest(path)? {
            let name = listed.name().to_owned();
            if let Some(first) = origin.get(&name) {
                return Err(RegistryError::DuplicateModule {
                    name,
                    first: first.display().to_string(),
                    second: path.display().to_string(),
                });
            }
            let descriptor = resolve(listed, catalog, path)?;
            let _ = origin.insert(name.clone(), path.to_path_buf());
            let _ = found.insert(name, descriptor);
        }
    }

    info!(dir = %dir.display(), count = found.len(), "module discovery complete");
    Ok(found)
}

fn is_manifest(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(MANIFEST_SUFFIX))
}

fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>, RegistryError> {
    let content = std::fs::read_to_string(path).map_err(|e| RegistryError::Discovery {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let manifest: Manifest = serde_json::from_str(&content).map_err(|e| RegistryError::Manifest {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(manifest.modules)
}

fn resolve(
    listed: ManifestEntry,
    catalog: &ModuleCatalog,
    path: &Path,
) -> Result<ModuleDescriptor, RegistryError> {
    let descriptor = catalog
        .get(listed.name())
        .cloned()
        .ok_or_else(|| RegistryError::UnknownModule {
            name: listed.name().to_owned(),
            path: path.to_path_buf(),
        })?;

    let ManifestEntry::Spec(spec) = listed else {
        return Ok(descriptor);
    };
    let mut descriptor = descriptor;
    if let Some(deps) = spec.dependencies {
        descriptor = descriptor.with_dependencies(deps);
    }
    if let Some(lifecycle) = spec.lifecycle {
        descriptor = descriptor.with_lifecycle(lifecycle);
    }
    if let Some(eager) = spec.eager_session {
        descriptor = descriptor.with_eager_session(eager);
    }
    Ok(descriptor)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
