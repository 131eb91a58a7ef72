//! VersionStore — the last known-good version and the deploy history.
//!
//! The marker is a single `MAJOR.MINOR.PATCH` line. It is only rewritten
//! through [`VersionStore::commit`], which writes a temp file, syncs it,
//! and renames it over the marker, so a crash never leaves a torn value.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use keel_core::{StateConfig, Version};
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};

/// What persisted a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction {
    Deployed,
    RolledBack,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Deployed => "deployed",
            HistoryAction::RolledBack => "rolled-back",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deployed" => Ok(HistoryAction::Deployed),
            "rolled-back" => Ok(HistoryAction::RolledBack),
            _ => Err(()),
        }
    }
}

/// One line of `history.log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub at: u64,
    pub action: HistoryAction,
    pub version: Version,
}

impl HistoryEntry {
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let at = parts.next()?.parse().ok()?;
        let action = parts.next()?.parse().ok()?;
        let version = Version::parse(parts.next()?).ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { at, action, version })
    }
}

#[derive(Debug, Clone)]
pub struct VersionStore {
    marker: PathBuf,
    history: PathBuf,
}

impl VersionStore {
    pub fn new(marker: impl Into<PathBuf>, history: impl Into<PathBuf>) -> Self {
        Self {
            marker: marker.into(),
            history: history.into(),
        }
    }

    pub fn from_config(state: &StateConfig) -> Self {
        Self::new(state.marker_path(), state.history_path())
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker
    }

    /// Read the persisted version, or [`Version::INITIAL`] on first run.
    pub fn current_version(&self) -> StateResult<Version> {
        Ok(self.read_marker()?.unwrap_or_else(|| {
            debug!(path = ?self.marker, "no version marker, assuming first run");
            Version::INITIAL
        }))
    }

    /// The persisted version, `None` when no marker was ever written.
    pub fn read_marker(&self) -> StateResult<Option<Version>> {
        let content = match fs::read_to_string(&self.marker) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StateError::io(&self.marker)(e)),
        };
        Version::parse(&content)
            .map(Some)
            .map_err(|_| StateError::CorruptMarker {
                path: self.marker.clone(),
                content: content.trim().to_string(),
            })
    }

    /// Persist `version` atomically.
    pub fn commit(&self, version: Version) -> StateResult<()> {
        if let Some(parent) = self.marker.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(StateError::io(parent))?;
        }
        let tmp = self.marker.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(StateError::io(&tmp))?;
            writeln!(file, "{version}").map_err(StateError::io(&tmp))?;
            file.sync_all().map_err(StateError::io(&tmp))?;
        }
        fs::rename(&tmp, &self.marker).map_err(StateError::io(&self.marker))?;
        debug!(%version, path = ?self.marker, "version marker committed");
        Ok(())
    }

    pub fn next_patch(&self, current: Version) -> StateResult<Version> {
        Ok(current.next_patch()?)
    }

    /// Resolve an explicit `MAJOR.MINOR` override against `current`.
    pub fn override_version(&self, current: Version, explicit: &str) -> StateResult<Version> {
        let version = Version::from_major_minor(explicit)?;
        if version <= current {
            warn!(%current, requested = %version, "explicit version does not move forward");
        }
        Ok(version)
    }

    /// The version a deploy from `current` should produce.
    pub fn plan_next(&self, current: Version, explicit: Option<&str>) -> StateResult<Version> {
        match explicit {
            Some(explicit) => self.override_version(current, explicit),
            None => self.next_patch(current),
        }
    }

    /// Append one entry to the ordered history log.
    pub fn append_history(&self, action: HistoryAction, version: Version) -> StateResult<()> {
        if let Some(parent) = self.history.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(StateError::io(parent))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history)
            .map_err(StateError::io(&self.history))?;
        writeln!(file, "{} {} {}", epoch_secs(), action, version)
            .map_err(StateError::io(&self.history))?;
        Ok(())
    }

    /// Every readable history entry, oldest first.
    pub fn history(&self) -> StateResult<Vec<HistoryEntry>> {
        let content = match fs::read_to_string(&self.history) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StateError::io(&self.history)(e)),
        };
        let mut entries = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match HistoryEntry::parse(line) {
                Some(entry) => entries.push(entry),
                None => warn!(line = index + 1, path = ?self.history, "skipping malformed history line"),
            }
        }
        Ok(entries)
    }
}

pub(crate) fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
