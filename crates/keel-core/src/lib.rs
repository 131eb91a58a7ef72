//! keel-core — shared types for the keel deploy tool.
//!
//! Holds the release [`Version`] model, [`ImageTag`], and the
//! [`KeelConfig`] loaded from `keel.toml` plus `KEEL_*` environment
//! overrides.

pub mod config;
pub mod duration;
pub mod paths;
pub mod version;

pub use config::{
    BackupConfig, ConfigError, HealthConfig, KeelConfig, RegistryConfig, ServiceConfig,
    StateConfig,
};
pub use duration::parse_duration;
pub use version::{ImageTag, Version, VersionError, sorted_versions};
