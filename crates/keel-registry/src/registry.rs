//! Collaborator interfaces consumed by the deploy orchestrator.

use std::path::Path;

use keel_core::{ImageTag, Version};

use crate::error::RegistryError;

/// Where versioned images live.
#[allow(async_fn_in_trait)]
pub trait ImageRegistry {
    /// Versioned tags of `image`, ascending by semantic version.
    async fn list_tags(&self, image: &str) -> Result<Vec<Version>, RegistryError>;

    /// Build `tag` from `dockerfile` in `context`.
    async fn build(&self, dockerfile: &Path, context: &Path, tag: &ImageTag)
    -> Result<(), RegistryError>;

    /// Delete `tag`. [`RegistryError::InUse`] means a container still
    /// references it; callers treat that as a warning.
    async fn remove(&self, tag: &ImageTag) -> Result<(), RegistryError>;

    /// The version backing the running service, if any container is up.
    async fn currently_active_tag(&self, image: &str) -> Result<Option<Version>, RegistryError>;
}

/// Starts and stops the containers of a service.
#[allow(async_fn_in_trait)]
pub trait ContainerRuntime {
    /// Stop and remove every container of `service`.
    async fn stop(&self, service: &str) -> Result<(), RegistryError>;

    /// Start `service` on image `tag`.
    async fn start(&self, service: &str, tag: &ImageTag) -> Result<(), RegistryError>;
}
