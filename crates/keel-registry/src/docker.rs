//! Docker CLI adapter.
//!
//! Images are managed with `docker image ls|build|rmi`; containers through
//! the configured compose command (`docker compose` by default). The tag
//! reaches the compose file through an environment variable, e.g.
//! `image: nitapi:${IMAGE_TAG}`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use keel_core::{ImageTag, ServiceConfig, Version, sorted_versions};
use tracing::{debug, info};

use crate::command::{CommandSpec, run, run_checked};
use crate::error::RegistryError;
use crate::registry::{ContainerRuntime, ImageRegistry};

const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct Docker {
    compose_command: Vec<String>,
    compose_file: PathBuf,
    service: String,
    tag_env: String,
    build_timeout: Duration,
    command_timeout: Duration,
}

impl Docker {
    pub fn from_config(service: &ServiceConfig) -> Self {
        Self {
            compose_command: service.compose_command.clone(),
            compose_file: service.compose_file.clone(),
            service: service.service.clone(),
            tag_env: service.tag_env.clone(),
            build_timeout: DEFAULT_BUILD_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// `<compose command> -f <file> <args...>`
    fn compose<'a>(&'a self, args: &[&str]) -> CommandSpec<'a> {
        let (program, base) = match self.compose_command.split_first() {
            Some((program, rest)) => (program.as_str(), rest),
            None => ("docker", &[][..]),
        };
        CommandSpec::new(program)
            .args(base.iter().cloned())
            .arg("-f")
            .arg(self.compose_file.display().to_string())
            .args(args.iter().copied())
    }
}

impl ImageRegistry for Docker {
    async fn list_tags(&self, image: &str) -> Result<Vec<Version>, RegistryError> {
        let spec = CommandSpec::new("docker").args(["image", "ls", image, "--format", "{{.Tag}}"]);
        let output = run_checked(&spec, self.command_timeout).await?;
        let tags = sorted_versions(output.stdout.lines());
        debug!(%image, count = tags.len(), "listed image tags");
        Ok(tags)
    }

    async fn build(
        &self,
        dockerfile: &Path,
        context: &Path,
        tag: &ImageTag,
    ) -> Result<(), RegistryError> {
        let spec = CommandSpec::new("docker")
            .arg("build")
            .arg("-f")
            .arg(dockerfile.display().to_string())
            .arg("-t")
            .arg(tag.reference())
            .arg(context.display().to_string());
        info!(%tag, "building image");
        run_checked(&spec, self.build_timeout).await?;
        Ok(())
    }

    async fn remove(&self, tag: &ImageTag) -> Result<(), RegistryError> {
        let spec = CommandSpec::new("docker").args(["rmi".to_string(), tag.reference()]);
        let output = run(&spec, self.command_timeout).await?;
        if output.success() {
            debug!(%tag, "image removed");
            return Ok(());
        }
        let stderr = output.stderr.trim().to_string();
        if is_in_use_message(&stderr) {
            return Err(RegistryError::InUse {
                tag: tag.reference(),
                detail: stderr,
            });
        }
        Err(RegistryError::Failed {
            command: spec.display(),
            code: output.status.code(),
            stderr,
        })
    }

    async fn currently_active_tag(&self, image: &str) -> Result<Option<Version>, RegistryError> {
        let ps = self.compose(&["ps", "-q", self.service.as_str()]);
        let output = run_checked(&ps, self.command_timeout).await?;
        let Some(container) = output.stdout.lines().map(str::trim).find(|l| !l.is_empty()) else {
            return Ok(None);
        };

        let inspect = CommandSpec::new("docker").args([
            "inspect",
            "--format",
            "{{.Config.Image}}",
            container,
        ]);
        let output = run_checked(&inspect, self.command_timeout).await?;
        Ok(version_from_reference(output.stdout.trim(), image))
    }
}

impl ContainerRuntime for Docker {
    async fn stop(&self, service: &str) -> Result<(), RegistryError> {
        run_checked(&self.compose(&["stop", service]), self.command_timeout).await?;
        run_checked(&self.compose(&["rm", "-f", service]), self.command_timeout).await?;
        info!(%service, "containers stopped and removed");
        Ok(())
    }

    async fn start(&self, service: &str, tag: &ImageTag) -> Result<(), RegistryError> {
        let spec = self
            .compose(&["up", "-d", "--no-deps", service])
            .env(self.tag_env.clone(), tag.version.to_string());
        run_checked(&spec, self.command_timeout).await?;
        info!(%service, %tag, "containers started");
        Ok(())
    }
}

/// Docker's wording when `rmi` refuses because a container holds the image.
fn is_in_use_message(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("conflict") || lower.contains("is being used") || lower.contains("in use")
}

/// Extract the version from `repo:tag` when `repo` is `image`.
fn version_from_reference(reference: &str, image: &str) -> Option<Version> {
    let (repo, tag) = split_reference(reference)?;
    if repo != image {
        return None;
    }
    Version::parse(tag).ok()
}

fn split_reference(reference: &str) -> Option<(&str, &str)> {
    let reference = reference.split('@').next()?;
    let slash = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
    let colon = reference[slash..].rfind(':')? + slash;
    Some((&reference[..colon], &reference[colon + 1..]))
}
