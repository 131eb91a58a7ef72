//! Pure version arithmetic: rollback targets and rotation victims.

use keel_core::Version;

/// Pick the version to roll back to from `active`.
///
/// `known_good` (the persisted marker during an automatic rollback) wins
/// when it is still in the registry and differs from `active`. Otherwise
/// the newest tag strictly older than `active` is chosen. With fewer than
/// two versioned tags there is nothing to go back to.
pub fn select_rollback_target(
    tags: &[Version],
    active: Version,
    known_good: Option<Version>,
) -> Option<Version> {
    if tags.len() < 2 {
        return None;
    }
    if let Some(good) = known_good.filter(|g| *g != active && tags.contains(g)) {
        return Some(good);
    }
    tags.iter().copied().filter(|v| *v < active).max()
}

/// Oldest tags beyond `retention`, never including `active`.
pub fn rotation_candidates(tags: &[Version], retention: usize, active: Version) -> Vec<Version> {
    let mut sorted = tags.to_vec();
    sorted.sort();
    sorted.dedup();
    let excess = sorted.len().saturating_sub(retention);
    sorted
        .into_iter()
        .take(excess)
        .filter(|v| *v != active)
        .collect()
}
