//! Error types for registry and runtime calls.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("`{command}` exited with {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The image is still referenced by a (possibly stopped) container.
    #[error("image {tag} is in use: {detail}")]
    InUse { tag: String, detail: String },
}

impl RegistryError {
    pub fn is_in_use(&self) -> bool {
        matches!(self, RegistryError::InUse { .. })
    }
}
