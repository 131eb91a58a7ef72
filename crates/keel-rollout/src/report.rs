//! What a finished run tells its caller.

use std::fmt;

use keel_core::Version;
use serde::Serialize;

use crate::phase::DeployPhase;

/// Which entry point produced the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Deploy,
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    /// The new version is live and persisted.
    Deployed { version: Version },
    /// `failed` was replaced by `restored`, which is now persisted.
    RolledBack { failed: Version, restored: Version },
}

/// Non-fatal problems collected along the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// `docker rmi` refused or failed; the tag is left in place.
    RemovalFailed { tag: String, reason: String },
    /// The registry could not be listed, so nothing was rotated.
    RegistryUnavailable { reason: String },
    /// The runtime could not say which tag is running.
    ActiveTagUnknown { reason: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::RemovalFailed { tag, reason } => write!(f, "could not remove {tag}: {reason}"),
            Warning::RegistryUnavailable { reason } => {
                write!(f, "registry unavailable, tags not rotated: {reason}")
            }
            Warning::ActiveTagUnknown { reason } => {
                write!(f, "running tag unknown, using version marker: {reason}")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub kind: RunKind,
    pub image: String,
    /// Persisted version when the run started.
    pub previous: Version,
    pub outcome: Outcome,
    /// Tags deleted by rotation or rollback cleanup.
    pub removed: Vec<Version>,
    pub warnings: Vec<Warning>,
    pub phases: Vec<DeployPhase>,
}

impl DeployReport {
    /// A deploy succeeded if it went live; a rollback if it rolled back.
    pub fn succeeded(&self) -> bool {
        matches!(
            (self.kind, &self.outcome),
            (RunKind::Deploy, Outcome::Deployed { .. })
                | (RunKind::Rollback, Outcome::RolledBack { .. })
        )
    }

    /// The version persisted at the end of the run.
    pub fn active(&self) -> Version {
        match self.outcome {
            Outcome::Deployed { version } => version,
            Outcome::RolledBack { restored, .. } => restored,
        }
    }
}
