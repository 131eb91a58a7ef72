//! Error types for snapshot and restore.

use std::path::PathBuf;

use thiserror::Error;

pub type SnapshotResult<T> = Result<T, SnapshotError>;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no snapshot at {0}")]
    MissingSnapshot(PathBuf),

    #[error("snapshot source {0} is not a directory")]
    SourceMissing(PathBuf),

    #[error("backup {backup} overlaps the tree it mirrors at {tree}")]
    Overlap { tree: PathBuf, backup: PathBuf },

    #[error("{0} holds excluded content and cannot be replaced")]
    ExcludedContent(PathBuf),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk directory tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid exclude pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl SnapshotError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| SnapshotError::Io { path, source }
    }
}
