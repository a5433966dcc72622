//! Module loading and cross-module resolution.
//!
//! [`DependencyResolver`] finds a module file by assembly name in an ordered
//! list of directories. [`ModuleSet`] opens the root modules, wires every
//! AssemblyRef of every loaded module to the module that satisfies it, and
//! implements [`TypeSystem`](crate::extract::TypeSystem) over the result.
//!
//! Root references are mandatory: if a root module references an assembly
//! that cannot be found the whole load fails. References made by
//! dependencies are followed on a best-effort basis and left unresolved when
//! missing.

mod assembly;
mod types;

pub use assembly::Assembly;

use crate::error::{Error, Result};
use crate::extract::ModuleId;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// File extensions tried for each module name, in order
pub const MODULE_EXTENSIONS: [&str; 3] = ["dll", "exe", "winmd"];

/// What the loader needs to know about a module to link it
pub trait Manifest {
    /// Assembly name
    fn name(&self) -> &str;

    /// File the module came from
    fn path(&self) -> &Path;

    /// Referenced assembly names, in AssemblyRef row order
    fn references(&self) -> &[String];
}

impl Manifest for Assembly {
    fn name(&self) -> &str {
        Assembly::name(self)
    }

    fn path(&self) -> &Path {
        Assembly::path(self)
    }

    fn references(&self) -> &[String] {
        Assembly::references(self)
    }
}

/// Finds module files by assembly name
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
    search_dirs: Vec<PathBuf>,
}

impl DependencyResolver {
    /// Creates a resolver searching `search_dirs` in order
    pub fn new<P: Into<PathBuf>>(search_dirs: impl IntoIterator<Item = P>) -> Self {
        Self {
            search_dirs: search_dirs.into_iter().map(Into::into).collect(),
        }
    }

    /// Directories searched, in order
    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// First `<dir>/<name>.<ext>`, matching the file name case-insensitively
    ///
    /// Directories are tried in order, and extensions in
    /// [`MODULE_EXTENSIONS`] order within a directory. An exact-case file
    /// wins over other spellings of the same name.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        self.search_dirs.iter().find_map(|dir| {
            let files = list_files(dir);
            MODULE_EXTENSIONS.iter().find_map(|ext| {
                let wanted = format!("{}.{}", name, ext);
                let exact = dir.join(&wanted);
                if exact.is_file() {
                    return Some(exact);
                }
                files
                    .iter()
                    .find(|path| {
                        path.file_name()
                            .and_then(|f| f.to_str())
                            .map_or(false, |f| f.eq_ignore_ascii_case(&wanted))
                    })
                    .cloned()
            })
        })
    }

    /// Finds and opens the module named `name`
    pub fn resolve(&self, name: &str) -> Result<Assembly> {
        let path = self
            .locate(name)
            .ok_or_else(|| Error::module_not_found(name, self.search_dirs.clone()))?;
        trace!("Resolved {} to {}", name, path.display());
        Assembly::open(&path).map_err(|e| Error::module_load(path, e))
    }
}

/// Files directly inside `dir`, sorted by name
fn list_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// A loaded module and the modules its AssemblyRefs resolved to
#[derive(Debug)]
pub struct ModuleHandle<M = Assembly> {
    module: M,
    dependencies: Vec<Option<ModuleId>>,
}

impl<M> ModuleHandle<M> {
    /// The loaded module
    pub fn module(&self) -> &M {
        &self.module
    }

    /// Module satisfying an AssemblyRef row, if it was found
    pub fn dependency(&self, assembly_ref: u32) -> Option<ModuleId> {
        assembly_ref
            .checked_sub(1)
            .and_then(|i| self.dependencies.get(i as usize))
            .copied()
            .flatten()
    }
}

/// Every module of one run: roots first, then dependencies in discovery order
#[derive(Debug)]
pub struct ModuleSet<M = Assembly> {
    modules: Vec<ModuleHandle<M>>,
    root_count: usize,
    by_name: HashMap<String, ModuleId>,
}

impl ModuleSet<Assembly> {
    /// Loads `roots` and their dependencies from `search_dirs`
    pub fn load(roots: &[PathBuf], search_dirs: &[PathBuf]) -> Result<Self> {
        Self::load_with(roots, &DependencyResolver::new(search_dirs.iter().cloned()))
    }

    /// Loads `roots`, resolving dependencies through `resolver`
    pub fn load_with(roots: &[PathBuf], resolver: &DependencyResolver) -> Result<Self> {
        let assemblies = roots
            .par_iter()
            .map(|path| Assembly::open(path).map_err(|e| Error::module_load(path, e)))
            .collect::<Result<Vec<_>>>()?;
        Self::link(assemblies, |name| resolver.resolve(name))
    }
}

impl<M: Manifest> ModuleSet<M> {
    /// Links `roots`, pulling in every referenced module through `resolve`
    pub fn link(roots: Vec<M>, mut resolve: impl FnMut(&str) -> Result<M>) -> Result<Self> {
        let mut set = Self {
            modules: Vec::with_capacity(roots.len()),
            root_count: roots.len(),
            by_name: HashMap::new(),
        };
        for module in roots {
            set.insert(module, None);
        }

        let mut missing: HashSet<String> = HashSet::new();
        let mut next = 0;
        while next < set.modules.len() {
            let is_root = next < set.root_count;
            let refs = set.modules[next].module.references().to_vec();

            let mut dependencies = Vec::with_capacity(refs.len());
            for name in refs {
                let key = name.to_lowercase();
                if let Some(&id) = set.by_name.get(&key) {
                    dependencies.push(Some(id));
                    continue;
                }
                if !is_root && missing.contains(&key) {
                    dependencies.push(None);
                    continue;
                }
                match resolve(&name) {
                    Ok(module) => dependencies.push(Some(set.insert(module, Some(key)))),
                    Err(e) if is_root => {
                        return Err(Error::module_load(set.modules[next].module.path(), e));
                    }
                    Err(e) => {
                        warn!(
                            "{}: dependency {} unavailable: {}",
                            set.modules[next].module.name(),
                            name,
                            e
                        );
                        missing.insert(key);
                        dependencies.push(None);
                    }
                }
            }
            set.modules[next].dependencies = dependencies;
            next += 1;
        }

        debug!(
            "Loaded {} root module(s) and {} dependenc(ies)",
            set.root_count,
            set.modules.len() - set.root_count
        );
        Ok(set)
    }

    fn insert(&mut self, module: M, requested: Option<String>) -> ModuleId {
        let id = self.modules.len();
        debug!("Loaded {} from {}", module.name(), module.path().display());
        self.by_name.entry(module.name().to_lowercase()).or_insert(id);
        if let Some(requested) = requested {
            self.by_name.entry(requested).or_insert(id);
        }
        self.modules.push(ModuleHandle {
            module,
            dependencies: Vec::new(),
        });
        id
    }

    /// Path of a loaded module
    pub fn path(&self, id: ModuleId) -> Option<&Path> {
        self.get(id).map(|m| m.module.path())
    }
}

impl<M> ModuleSet<M> {
    /// Number of loaded modules, dependencies included
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// True when nothing was loaded
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Number of root modules
    pub fn root_count(&self) -> usize {
        self.root_count
    }

    /// Module by id
    pub fn get(&self, id: ModuleId) -> Option<&ModuleHandle<M>> {
        self.modules.get(id)
    }

    /// Module loaded under an assembly name (case-insensitive)
    pub fn find(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    pub(crate) fn handle(&self, id: ModuleId) -> &ModuleHandle<M> {
        &self.modules[id]
    }

    pub(crate) fn module(&self, id: ModuleId) -> &M {
        &self.modules[id].module
    }
}
