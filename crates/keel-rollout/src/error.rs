//! Deploy errors, grouped by how much was touched before they happened.

use std::path::PathBuf;

use keel_core::VersionError;
use keel_registry::RegistryError;
use keel_snapshot::SnapshotError;
use keel_state::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    /// Another run holds the image lock. Nothing was touched.
    #[error("another deployment of `{image}` is in progress (lock {path} held by {holder})")]
    ConcurrentDeployment {
        image: String,
        path: PathBuf,
        holder: String,
    },

    /// The pre-deploy backup failed. Nothing was touched.
    #[error("pre-deploy snapshot failed: {0}")]
    Snapshot(#[source] SnapshotError),

    /// The image build failed. No container was touched.
    #[error("build of {tag} failed: {source}")]
    Build {
        tag: String,
        #[source]
        source: RegistryError,
    },

    /// Restoring files during rollback failed.
    #[error("restoring files failed during rollback, operator intervention required: {0}")]
    RestoreFailed(#[source] SnapshotError),

    /// Rollback impossible or failed after the service was touched.
    #[error("rollback failed, operator intervention required: {reason}")]
    Unrecoverable { reason: String },

    #[error("invalid exclude configuration: {0}")]
    Excludes(#[source] SnapshotError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    State(StateError),
}

impl From<StateError> for DeployError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::LockHeld {
                image,
                path,
                holder,
            } => DeployError::ConcurrentDeployment {
                image,
                path,
                holder,
            },
            other => DeployError::State(other),
        }
    }
}

impl DeployError {
    /// Whether the running service was possibly affected.
    pub fn after_impact(&self) -> bool {
        matches!(
            self,
            DeployError::RestoreFailed(_) | DeployError::Unrecoverable { .. }
        )
    }
}
