//! Path comparison for backup source and destination.
//!
//! Paths are compared after resolution, so `app`, `./app`, and
//! `app/../app` are the same directory even when they do not exist yet.

use std::fs;
use std::path::{Component, Path, PathBuf};

/// Absolute form of `path` with `.`/`..` removed and symlinks resolved
/// on the longest prefix that exists.
pub fn resolve(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    if let Ok(real) = fs::canonicalize(&absolute) {
        return real;
    }

    let mut normal = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normal.pop();
            }
            other => normal.push(other.as_os_str()),
        }
    }

    let mut missing = Vec::new();
    let mut existing = normal.as_path();
    loop {
        if let Ok(real) = fs::canonicalize(existing) {
            return missing.iter().rev().fold(real, |acc, name| acc.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return normal,
        }
    }
}

/// Whether `inner` is `outer` or lies below it.
pub fn encloses(outer: &Path, inner: &Path) -> bool {
    resolve(inner).starts_with(resolve(outer))
}
