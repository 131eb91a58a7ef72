//! keel-rollout — zero-surprise deploys with automatic rollback.
//!
//! An [`Orchestrator`] runs one deploy or rollback from `Idle` to a
//! terminal [`DeployPhase`]:
//!
//! - **deploy** — snapshot files, build `image:X.Y.Z`, swap containers,
//!   wait on the health gate, then rotate old tags and persist the version.
//!   An unhealthy release is rolled back in the same run.
//! - **rollback** — restore files, swap to the newest tag older than the
//!   running one, delete the replaced tag, persist.
//!
//! The registry, runtime, and health gate are generic so tests drive the
//! full state machine with in-memory fakes.

pub mod error;
pub mod orchestrator;
pub mod phase;
pub mod plan;
pub mod report;

pub use error::DeployError;
pub use orchestrator::{Orchestrator, has_snapshot, restore_backup, snapshotter_for, take_backup};
pub use phase::DeployPhase;
pub use plan::{rotation_candidates, select_rollback_target};
pub use report::{DeployReport, Outcome, RunKind, Warning};
