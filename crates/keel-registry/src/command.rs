//! Bounded child-process execution for docker CLI calls.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::RegistryError;

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// A command line plus environment, rendered for logs and errors.
#[derive(Debug, Clone)]
pub struct CommandSpec<'a> {
    pub program: &'a str,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub work_dir: Option<&'a Path>,
}

impl<'a> CommandSpec<'a> {
    pub fn new(program: &'a str) -> Self {
        Self {
            program,
            args: Vec::new(),
            envs: Vec::new(),
            work_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn display(&self) -> String {
        let mut rendered = self.program.to_string();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }
}

/// Run `spec`, killing the child if it outlives `timeout`.
///
/// A non-zero exit is returned as output, not as an error; callers decide
/// what a failure means.
pub async fn run(spec: &CommandSpec<'_>, timeout: Duration) -> Result<CommandOutput, RegistryError> {
    let command_line = spec.display();
    debug!(command = %command_line, "running");

    let mut command = Command::new(spec.program);
    command
        .args(&spec.args)
        .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = spec.work_dir {
        command.current_dir(dir);
    }

    let child = command.spawn().map_err(|source| RegistryError::Spawn {
        command: command_line.clone(),
        source,
    })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| RegistryError::Spawn {
            command: command_line.clone(),
            source,
        })?,
        Err(_) => {
            return Err(RegistryError::Timeout {
                command: command_line,
                after: timeout,
            });
        }
    };

    Ok(CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run `spec` and turn a non-zero exit into [`RegistryError::Failed`].
pub async fn run_checked(
    spec: &CommandSpec<'_>,
    timeout: Duration,
) -> Result<CommandOutput, RegistryError> {
    let output = run(spec, timeout).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(RegistryError::Failed {
            command: spec.display(),
            code: output.status.code(),
            stderr: output.stderr.trim().to_string(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let spec = CommandSpec::new("echo").arg("hello");
        let output = run(&spec, Duration::from_secs(5)).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn passes_environment() {
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo $IMAGE_TAG"])
            .env("IMAGE_TAG", "1.0.3");
        let output = run(&spec, Duration::from_secs(5)).await.unwrap();
        assert_eq!(output.stdout.trim(), "1.0.3");
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let spec = CommandSpec::new("nonexistent_command_12345");
        let err = run(&spec, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, RegistryError::Spawn { .. }));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let spec = CommandSpec::new("sleep").arg("5");
        let err = run(&spec, Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, RegistryError::Timeout { .. }));
    }

    #[tokio::test]
    async fn checked_run_reports_failure() {
        let spec = CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 3"]);
        let err = run_checked(&spec, Duration::from_secs(5)).await.unwrap_err();
        match err {
            RegistryError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn display_joins_args() {
        let spec = CommandSpec::new("docker").args(["rmi", "nitapi:1.0.0"]);
        assert_eq!(spec.display(), "docker rmi nitapi:1.0.0");
    }
}
