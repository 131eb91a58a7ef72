//! keel-snapshot — file backups taken before every deploy.
//!
//! A [`Snapshotter`] mirrors a working tree into a backup directory and
//! back again. At most one snapshot exists at a time: each new snapshot
//! deletes the previous one first.

pub mod error;
pub mod exclude;
pub mod snapshot;

pub use error::{SnapshotError, SnapshotResult};
pub use exclude::ExcludeSet;
pub use snapshot::{RestoreStats, SnapshotStats, Snapshotter};
