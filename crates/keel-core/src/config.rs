//! keel.toml configuration parser with environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duration::parse_duration;
use crate::paths;

pub const DEFAULT_CONFIG_FILE: &str = "keel.toml";

const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: `{value}`")]
    InvalidEnv { key: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete tool configuration, one section per concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeelConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub state: StateConfig,
    pub backup: Option<BackupConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Image repository name, without a tag.
    pub image: String,
    /// Compose service backed by the image.
    pub service: String,
    pub compose_file: PathBuf,
    pub dockerfile: PathBuf,
    /// Build context directory.
    pub context: PathBuf,
    /// Environment variable the compose file reads the tag from.
    pub tag_env: String,
    pub compose_command: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            image: String::new(),
            service: "web".to_string(),
            compose_file: PathBuf::from("docker-compose.yml"),
            dockerfile: PathBuf::from("Dockerfile"),
            context: PathBuf::from("."),
            tag_env: "IMAGE_TAG".to_string(),
            compose_command: vec!["docker".to_string(), "compose".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Number of versioned images kept after a successful deploy.
    pub retention: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { retention: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub url: String,
    pub timeout: String,
    pub interval: String,
    pub request_timeout: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8000/health/?format=json".to_string(),
            timeout: "120s".to_string(),
            interval: "5s".to_string(),
            request_timeout: "5s".to_string(),
        }
    }
}

impl HealthConfig {
    /// Overall budget for the health gate.
    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(DEFAULT_HEALTH_TIMEOUT)
    }

    /// Pause between probes.
    pub fn interval(&self) -> Duration {
        parse_duration(&self.interval).unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    /// Upper bound for a single GET.
    pub fn request_timeout(&self) -> Duration {
        parse_duration(&self.request_timeout).unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Holds the version marker, history log, and lock files.
    pub dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".keel"),
        }
    }
}

impl StateConfig {
    pub fn marker_path(&self) -> PathBuf {
        self.dir.join("version")
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join("history.log")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_source")]
    pub source: PathBuf,
    pub dest: PathBuf,
    #[serde(default = "default_excludes")]
    pub exclude: Vec<String>,
}

fn default_backup_source() -> PathBuf {
    PathBuf::from(".")
}

/// Runtime-only paths never mirrored in either direction.
pub fn default_excludes() -> Vec<String> {
    ["logs", "static", "media", ".env", ".git"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl KeelConfig {
    /// Load `path` (if it exists), overlay process environment, validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`KeelConfig::load`] with an injectable environment lookup.
    pub fn load_with<F>(path: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if path.is_file() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `KEEL_*` environment variables onto file values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("KEEL_IMAGE") {
            self.service.image = v;
        }
        if let Some(v) = lookup("KEEL_SERVICE") {
            self.service.service = v;
        }
        if let Some(v) = lookup("KEEL_COMPOSE_FILE") {
            self.service.compose_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("KEEL_RETENTION") {
            self.registry.retention = v.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: "KEEL_RETENTION".to_string(),
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("KEEL_HEALTH_URL") {
            self.health.url = v;
        }
        if let Some(v) = lookup("KEEL_HEALTH_TIMEOUT") {
            self.health.timeout = v;
        }
        if let Some(v) = lookup("KEEL_HEALTH_INTERVAL") {
            self.health.interval = v;
        }
        if let Some(v) = lookup("KEEL_STATE_DIR") {
            self.state.dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("KEEL_BACKUP_DEST") {
            match self.backup.as_mut() {
                Some(backup) => backup.dest = PathBuf::from(v),
                None => {
                    self.backup = Some(BackupConfig {
                        source: default_backup_source(),
                        dest: PathBuf::from(v),
                        exclude: default_excludes(),
                    })
                }
            }
        }
        if let Some(v) = lookup("KEEL_BACKUP_SOURCE") {
            match self.backup.as_mut() {
                Some(backup) => backup.source = PathBuf::from(v),
                None => {
                    return Err(ConfigError::Invalid(
                        "KEEL_BACKUP_SOURCE is set but no backup destination is configured"
                            .to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.image.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "service.image is required (or set KEEL_IMAGE)".to_string(),
            ));
        }
        if self.service.service.trim().is_empty() {
            return Err(ConfigError::Invalid("service.service is empty".to_string()));
        }
        if self.service.compose_command.is_empty() {
            return Err(ConfigError::Invalid(
                "service.compose_command is empty".to_string(),
            ));
        }
        for (key, value) in [
            ("health.timeout", &self.health.timeout),
            ("health.interval", &self.health.interval),
            ("health.request_timeout", &self.health.request_timeout),
        ] {
            if parse_duration(value).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "{key} `{value}` is not a duration"
                )));
            }
        }
        if self.health.interval().is_zero() {
            return Err(ConfigError::Invalid(
                "health.interval must be greater than zero".to_string(),
            ));
        }
        if !self.health.url.starts_with("http://") {
            return Err(ConfigError::Invalid(format!(
                "health.url `{}` must be an http:// URL",
                self.health.url
            )));
        }
        if let Some(backup) = &self.backup {
            if backup.dest.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("backup.dest is empty".to_string()));
            }
            if paths::encloses(&backup.dest, &backup.source) {
                return Err(ConfigError::Invalid(format!(
                    "backup.dest `{}` must not be backup.source `{}` or one of its parents",
                    backup.dest.display(),
                    backup.source.display()
                )));
            }
        }
        Ok(())
    }
}
