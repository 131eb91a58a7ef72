//! keel-state — persisted deploy state.
//!
//! - **`store`** — the version marker (last known-good version, written
//!   atomically) and the append-only `history.log`.
//! - **`lock`** — the per-image lock that keeps two deployments of the same
//!   image from racing on the marker or the container swap.

pub mod error;
pub mod lock;
pub mod store;

pub use error::{StateError, StateResult};
pub use lock::DeployLock;
pub use store::{HistoryAction, HistoryEntry, VersionStore};
