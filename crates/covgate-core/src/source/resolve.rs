//! Resolution of logical (import-path-qualified) file names to files on disk.
//!
//! Coverage profiles name files by import path, e.g. `example.com/pkg/a.go`.
//! The engine never guesses where such a file lives; it asks a
//! [`PathResolver`]. The resolvers here cover the common layouts without
//! spawning any process:
//!
//! - [`ModuleResolver`]: a module root whose `go.mod` declares the prefix
//! - [`LocalResolver`]: `_/abs/dir/file.go` local import paths, absolute
//!   paths and paths relative to a root directory
//! - [`StaticResolver`]: an explicit prefix → directory table
//! - [`ChainResolver`]: first match among several resolvers

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{CovError, CovResult};

/// Maps a logical file name to a readable path.
pub trait PathResolver: Send + Sync {
    /// The on-disk path of `logical`, or `None` when this resolver does not
    /// know the file.
    fn resolve(&self, logical: &str) -> Option<PathBuf>;
}

impl<T: PathResolver + ?Sized> PathResolver for Box<T> {
    fn resolve(&self, logical: &str) -> Option<PathBuf> {
        (**self).resolve(logical)
    }
}

// ============================================================================
// Module Resolver
// ============================================================================

/// Resolves files of the Go module rooted at a directory.
#[derive(Debug, Clone)]
pub struct ModuleResolver {
    root: PathBuf,
    module: String,
}

impl ModuleResolver {
    pub fn new(root: impl Into<PathBuf>, module: impl Into<String>) -> Self {
        ModuleResolver {
            root: root.into(),
            module: module.into(),
        }
    }

    /// Read the module path from `<root>/go.mod`.
    pub fn discover(root: &Path) -> CovResult<Self> {
        let go_mod = root.join("go.mod");
        let text = fs::read_to_string(&go_mod).map_err(|e| CovError::io(&go_mod, e))?;
        let module = module_path(&text).ok_or_else(|| CovError::InvalidConfig {
            path: go_mod.clone(),
            message: "no module directive".to_string(),
        })?;
        debug!(root = %root.display(), module, "discovered module");
        Ok(ModuleResolver::new(root, module))
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PathResolver for ModuleResolver {
    fn resolve(&self, logical: &str) -> Option<PathBuf> {
        let rest = logical
            .strip_prefix(self.module.as_str())?
            .strip_prefix('/')?;
        Some(self.root.join(rest))
    }
}

/// The `module` directive of a go.mod file.
pub fn module_path(go_mod: &str) -> Option<String> {
    go_mod.lines().find_map(|line| {
        let line = line.split("//").next().unwrap_or("").trim();
        let rest = line.strip_prefix("module")?;
        if !rest.starts_with([' ', '\t']) {
            return None;
        }
        let name = rest.trim().trim_matches('"');
        (!name.is_empty()).then(|| name.to_string())
    })
}

// ============================================================================
// Local Resolver
// ============================================================================

/// Resolves local import paths and plain file paths.
#[derive(Debug, Clone)]
pub struct LocalResolver {
    root: PathBuf,
}

impl LocalResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalResolver { root: root.into() }
    }
}

impl PathResolver for LocalResolver {
    fn resolve(&self, logical: &str) -> Option<PathBuf> {
        if let Some(abs) = logical.strip_prefix('_') {
            if abs.starts_with('/') {
                return Some(PathBuf::from(abs));
            }
        }
        let path = Path::new(logical);
        if path.is_absolute() {
            return Some(path.to_path_buf());
        }
        let candidate = self.root.join(path);
        candidate.is_file().then_some(candidate)
    }
}

// ============================================================================
// Static Resolver
// ============================================================================

/// Longest-prefix lookup in a fixed table of import path → directory.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: Vec<(String, PathBuf)>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map every file under import path `prefix` into `dir`.
    pub fn with(mut self, prefix: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.insert(prefix, dir);
        self
    }

    pub fn insert(&mut self, prefix: impl Into<String>, dir: impl Into<PathBuf>) {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        self.entries.push((prefix, dir.into()));
        self.entries
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PathResolver for StaticResolver {
    fn resolve(&self, logical: &str) -> Option<PathBuf> {
        self.entries.iter().find_map(|(prefix, dir)| {
            let rest = logical.strip_prefix(prefix.as_str())?.strip_prefix('/')?;
            Some(dir.join(rest))
        })
    }
}

// ============================================================================
// Chain Resolver
// ============================================================================

/// Tries each resolver in order.
#[derive(Default)]
pub struct ChainResolver {
    resolvers: Vec<Box<dyn PathResolver>>,
}

impl ChainResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, resolver: impl PathResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }
}

impl PathResolver for ChainResolver {
    fn resolve(&self, logical: &str) -> Option<PathBuf> {
        self.resolvers.iter().find_map(|r| r.resolve(logical))
    }
}

impl std::fmt::Debug for ChainResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainResolver")
            .field("resolvers", &self.resolvers.len())
            .finish()
    }
}
