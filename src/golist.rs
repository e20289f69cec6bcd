//! Package discovery through `go list`.
//!
//! Two questions need the Go toolchain's own answer:
//!
//! - Which packages does a pattern such as `./...` name? ([`expand_patterns`])
//! - Which directory holds an import path that lies outside the local
//!   module, e.g. a dependency or a second module in a workspace?
//!   ([`GoListResolver`])

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command as ProcessCommand, Stdio};
use std::sync::Mutex;

use tokio::process::Command;
use tracing::{debug, warn};

use covgate_core::{CovError, CovResult, PathResolver};

/// Locate the `go` executable on `PATH`.
pub fn find_go() -> CovResult<PathBuf> {
    which::which("go").map_err(|e| {
        CovError::invalid_argument(format!("go toolchain not found on PATH: {}", e))
    })
}

/// Expand package patterns into sorted, unique import paths.
///
/// Patterns without `...` are returned unchanged, so a plain list of
/// directories never needs the toolchain.
pub async fn expand_patterns(
    go: &Path,
    root: &Path,
    patterns: &[String],
) -> CovResult<Vec<String>> {
    if !patterns.iter().any(|p| p.contains("...")) {
        return Ok(patterns.to_vec());
    }

    let output = Command::new(go)
        .arg("list")
        .arg("-f")
        .arg("{{.ImportPath}}")
        .args(patterns)
        .current_dir(root)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| CovError::io(go, e))?;

    if !output.status.success() {
        return Err(CovError::TestRunFailed {
            target: format!("go list {}", patterns.join(" ")),
            exit_code: output.status.code(),
            output: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let packages = parse_package_list(&String::from_utf8_lossy(&output.stdout));
    debug!(patterns = ?patterns, packages = packages.len(), "expanded package patterns");
    Ok(packages)
}

/// One import path per non-blank line, sorted and deduplicated.
pub fn parse_package_list(stdout: &str) -> Vec<String> {
    let mut packages: Vec<String> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    packages.sort();
    packages.dedup();
    packages
}

/// Split `ns/a/a.go` into package `ns/a` and file `a.go`.
pub fn split_logical(logical: &str) -> Option<(&str, &str)> {
    logical
        .rsplit_once('/')
        .filter(|(pkg, file)| !pkg.is_empty() && !file.is_empty())
}

/// Resolves files by asking `go list` for their package directory.
///
/// Each package is looked up at most once; misses are cached too.
pub struct GoListResolver {
    go: PathBuf,
    root: PathBuf,
    dirs: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl GoListResolver {
    pub fn new(go: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        GoListResolver {
            go: go.into(),
            root: root.into(),
            dirs: Mutex::new(HashMap::new()),
        }
    }

    fn package_dir(&self, package: &str) -> Option<PathBuf> {
        let output = ProcessCommand::new(&self.go)
            .arg("list")
            .arg("-f")
            .arg("{{.Dir}}")
            .arg(package)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();
        match output {
            Ok(output) if output.status.success() => {
                let dir = String::from_utf8_lossy(&output.stdout).trim().to_string();
                (!dir.is_empty()).then(|| PathBuf::from(dir))
            }
            Ok(_) => {
                debug!(package, "go list does not know package");
                None
            }
            Err(e) => {
                warn!("failed to run go list for {}: {}", package, e);
                None
            }
        }
    }
}

impl PathResolver for GoListResolver {
    fn resolve(&self, logical: &str) -> Option<PathBuf> {
        let (package, file) = split_logical(logical)?;
        let mut dirs = match self.dirs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let dir = dirs
            .entry(package.to_string())
            .or_insert_with(|| self.package_dir(package));
        dir.as_ref().map(|d| d.join(file))
    }
}

impl std::fmt::Debug for GoListResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoListResolver")
            .field("go", &self.go)
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_list_is_sorted_and_unique() {
        let out = "ns/b\n\nns/a\nns/b\n  ns/c  \n";
        assert_eq!(parse_package_list(out), vec!["ns/a", "ns/b", "ns/c"]);
    }

    #[test]
    fn logical_names_split_at_last_slash() {
        assert_eq!(split_logical("ns/a/a.go"), Some(("ns/a", "a.go")));
        assert_eq!(split_logical("main.go"), None);
        assert_eq!(split_logical("ns/"), None);
    }

    #[tokio::test]
    async fn plain_patterns_skip_the_toolchain() {
        let patterns = vec!["./a".to_string(), "./b".to_string()];
        let expanded = expand_patterns(Path::new("/nonexistent/go"), Path::new("."), &patterns)
            .await
            .unwrap();
        assert_eq!(expanded, patterns);
    }

    #[test]
    fn missing_program_resolves_nothing() {
        let resolver = GoListResolver::new("/nonexistent/go", ".");
        assert_eq!(resolver.resolve("ns/a/a.go"), None);
        // The miss is cached.
        assert_eq!(resolver.dirs.lock().unwrap().len(), 1);
    }
}
