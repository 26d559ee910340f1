//! Host-side files bind-mounted into service containers.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// When an existing file is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Static content: keep a file that already has the expected mode.
    IfMissing,
    /// Per-run content: always rewrite.
    Always,
}

/// Write `data` to `path` with permission bits `mode`.
///
/// Returns `false` when the file was already in place and left untouched.
pub fn materialize(path: &Path, data: &[u8], mode: u32, refresh: Refresh) -> Result<bool> {
    if refresh == Refresh::IfMissing && has_mode(path, mode) {
        tracing::debug!("{} already present", path.display());
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        // read-only files can't be truncated in place
        fs::remove_file(path)?;
    }
    fs::write(path, data).map_err(|e| {
        Error::Config(format!("could not write '{}': {}", path.display(), e))
    })?;
    set_mode(path, mode)?;
    tracing::debug!("Wrote {} ({:o})", path.display(), mode);
    Ok(true)
}

#[cfg(unix)]
fn has_mode(path: &Path, mode: u32) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o777 == mode)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn has_mode(path: &Path, _mode: u32) -> bool {
    path.is_file()
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
