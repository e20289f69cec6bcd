//! Loading already-produced raw profiles from disk.
//!
//! `--load` patterns are globs relative to the aggregation root. Matching
//! files are read in path order, so the same tree always yields the same
//! input sequence. Hidden directories are not descended into, and the merged
//! output file itself is never loaded back in.

use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;
use walkdir::WalkDir;

use covgate_core::{CovError, CovResult, RawProfile};

fn build_globset(patterns: &[String]) -> CovResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern.trim_start_matches("./")).map_err(|e| {
            CovError::invalid_argument(format!("invalid load pattern '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| CovError::invalid_argument(format!("invalid load patterns: {}", e)))
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Paths under `root` matching any of `patterns`, sorted.
pub fn find_profiles(
    root: &Path,
    patterns: &[String],
    skip: Option<&Path>,
) -> CovResult<Vec<PathBuf>> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }
    let globs = build_globset(patterns)?;

    let mut found = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            CovError::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if skip.is_some_and(|s| s == entry.path()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/");
        if globs.is_match(&relative) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

/// Read every profile matching `patterns` under `root`.
pub fn load_profiles(
    root: &Path,
    patterns: &[String],
    skip: Option<&Path>,
) -> CovResult<Vec<RawProfile>> {
    let paths = find_profiles(root, patterns, skip)?;
    debug!(patterns = ?patterns, files = paths.len(), "loading raw profiles");
    paths
        .into_iter()
        .map(|path| {
            let text = fs::read_to_string(&path).map_err(|e| CovError::io(&path, e))?;
            Ok(RawProfile::new(path.display().to_string(), text))
        })
        .collect()
}
