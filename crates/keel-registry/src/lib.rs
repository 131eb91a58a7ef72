//! keel-registry — image registry and container runtime collaborators.
//!
//! The orchestrator only talks to the [`ImageRegistry`] and
//! [`ContainerRuntime`] traits. [`Docker`] implements both by shelling out
//! to the docker CLI and a compose command, each call bounded by a timeout.

pub mod command;
pub mod docker;
pub mod error;
pub mod registry;

pub use docker::Docker;
pub use error::RegistryError;
pub use registry::{ContainerRuntime, ImageRegistry};
