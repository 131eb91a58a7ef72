//! Orchestrator phases.

use std::fmt;

use serde::Serialize;

/// A state of the deploy/rollback state machine.
///
/// ```text
/// Idle → Building → Swapping → HealthChecking ─┬→ Healthy → Rotating → Done
///   │                                          └→ Unhealthy ─┐
///   └─────────────── (manual rollback) ─────────→ RollingBack ┴→ RolledBack
///                                                            └→ Unrecoverable
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployPhase {
    Idle,
    Building,
    /// Old containers stopped, new ones starting. The only downtime window.
    Swapping,
    HealthChecking,
    Healthy,
    Unhealthy,
    Rotating,
    Done,
    RollingBack,
    RolledBack,
    /// Rollback impossible or failed; nothing persisted.
    Unrecoverable,
}

impl DeployPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployPhase::Idle => "idle",
            DeployPhase::Building => "building",
            DeployPhase::Swapping => "swapping",
            DeployPhase::HealthChecking => "health_checking",
            DeployPhase::Healthy => "healthy",
            DeployPhase::Unhealthy => "unhealthy",
            DeployPhase::Rotating => "rotating",
            DeployPhase::Done => "done",
            DeployPhase::RollingBack => "rolling_back",
            DeployPhase::RolledBack => "rolled_back",
            DeployPhase::Unrecoverable => "unrecoverable",
        }
    }
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
