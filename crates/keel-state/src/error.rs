//! Error types for keel's persisted state.

use std::path::PathBuf;

use keel_core::VersionError;
use thiserror::Error;

/// Result type alias for state operations.
pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("version marker {path} is corrupt: `{content}`")]
    CorruptMarker { path: PathBuf, content: String },

    #[error("a deployment for `{image}` is already running (lock {path} held by {holder})")]
    LockHeld {
        image: String,
        path: PathBuf,
        holder: String,
    },

    #[error(transparent)]
    Version(#[from] VersionError),
}

impl StateError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| StateError::Io { path, source }
    }
}
