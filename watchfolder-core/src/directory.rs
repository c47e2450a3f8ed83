//! Directory validation and path expansion helpers.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::ConfigError;

/// `true` iff `path` exists, is a directory, and the process may both read
/// and write it. No side effects.
pub fn is_valid(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => is_read_writable(path),
        _ => false,
    }
}

#[cfg(unix)]
fn is_read_writable(path: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};

    access(path, AccessFlags::R_OK | AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
fn is_read_writable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| !meta.permissions().readonly())
        .unwrap_or(false)
}

/// Expand `path` to an absolute, lexically normalised path.
///
/// A leading `~` is replaced by the home directory; relative paths are
/// joined onto the current directory. `.` and `..` are resolved without
/// touching the filesystem, so symlinks are kept as written.
pub fn expand(path: &Path) -> Result<PathBuf, ConfigError> {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .ok_or(ConfigError::HomeNotFound)?
            .join(rest),
        Err(_) => path.to_path_buf(),
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .map_err(|source| ConfigError::Io {
                path: expanded.clone(),
                source,
            })?
            .join(expanded)
    };

    Ok(normalize(&absolute))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
