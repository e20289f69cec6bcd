//! Atomic persistence of the canonical profile.
//!
//! The profile is written to a sibling temp file and renamed into place, so
//! a concurrent reader sees either the previous file or the complete new one.
//!
//! Crash safety:
//! - Before rename: the temp file is orphaned (harmless)
//! - After rename: the write completed

use std::fs;
use std::io;
use std::path::Path;

use tracing::info;

use crate::error::{CovError, CovResult};
use crate::profile::CoverageProfile;

/// Write `content` to `path` via temp file + rename, creating parent
/// directories as needed.
///
/// The temp name carries PID and timestamp so concurrent writers never
/// share one.
pub fn write_atomic(path: &Path, content: &[u8]) -> CovResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CovError::io(parent, e))?;
    }

    let temp_path = temp_sibling(path);
    let result = fs::write(&temp_path, content).and_then(|()| fs::rename(&temp_path, path));
    if let Err(error) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(CovError::io(path, error));
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> std::path::PathBuf {
    use std::time::{SystemTime, UNIX_EPOCH};

    let pid = std::process::id();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        pid,
        timestamp
    ))
}

/// Persist the canonical profile in its rendered form.
pub fn write_profile(path: &Path, profile: &CoverageProfile) -> CovResult<()> {
    write_atomic(path, profile.render().as_bytes())?;
    info!(path = %path.display(), blocks = profile.len(), "wrote merged profile");
    Ok(())
}

/// Whether an I/O error means the file simply is not there.
pub fn is_not_found(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::NotFound
}
