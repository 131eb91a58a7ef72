//! DeployLock — one running deployment per image.
//!
//! The lock is a `<image>.lock` file created with create-new semantics.
//! A second acquire fails immediately instead of waiting. The file is
//! removed when the guard is dropped.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::store::epoch_secs;

#[derive(Debug)]
pub struct DeployLock {
    path: PathBuf,
}

impl DeployLock {
    /// Take the lock for `image` under `dir`, or fail with
    /// [`StateError::LockHeld`].
    pub fn acquire(dir: &Path, image: &str) -> StateResult<Self> {
        fs::create_dir_all(dir).map_err(StateError::io(dir))?;
        let path = lock_path(dir, image);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|_| "unknown holder".to_string());
                return Err(StateError::LockHeld {
                    image: image.to_string(),
                    path,
                    holder,
                });
            }
            Err(e) => return Err(StateError::io(&path)(e)),
        };

        // The guard owns the file from here; drop cleans up on write failure.
        let lock = Self { path };
        writeln!(file, "pid={} since={}", std::process::id(), epoch_secs())
            .map_err(StateError::io(&lock.path))?;
        debug!(%image, path = ?lock.path, "deploy lock acquired");
        Ok(lock)
    }

    /// Contents of the lock file if someone holds it.
    pub fn holder(dir: &Path, image: &str) -> Option<String> {
        fs::read_to_string(lock_path(dir, image))
            .ok()
            .map(|s| s.trim().to_string())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = ?self.path, "deploy lock released"),
            Err(e) => warn!(path = ?self.path, error = %e, "failed to remove deploy lock"),
        }
    }
}

fn lock_path(dir: &Path, image: &str) -> PathBuf {
    let name: String = image
        .chars()
        .map(|c| if matches!(c, '/' | ':' | '\\') { '_' } else { c })
        .collect();
    dir.join(format!("{name}.lock"))
}
