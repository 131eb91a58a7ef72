//! Release versions and the image tags built from them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing or deriving versions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version `{input}`: {reason}")]
    Invalid { input: String, reason: String },

    #[error("version `{0}` carries pre-release or build metadata")]
    Qualified(String),

    #[error("invalid explicit version `{0}`: expected MAJOR.MINOR")]
    InvalidOverride(String),

    #[error("version {0} has no next patch release")]
    PatchOverflow(Version),
}

/// A `MAJOR.MINOR.PATCH` release version.
///
/// Field order makes the derived `Ord` numeric per component, so
/// `1.9.0 < 1.10.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    /// Version assumed when no marker has been persisted yet.
    pub const INITIAL: Version = Version::new(1, 0, 0);

    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    /// Parse `MAJOR.MINOR.PATCH`, tolerating a leading `v`.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let parsed = semver::Version::parse(bare).map_err(|e| VersionError::Invalid {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
        if !parsed.pre.is_empty() || !parsed.build.is_empty() {
            return Err(VersionError::Qualified(input.to_string()));
        }
        Ok(Self::new(parsed.major, parsed.minor, parsed.patch))
    }

    /// The same version with the patch component bumped by one.
    pub fn next_patch(self) -> Result<Self, VersionError> {
        let patch = self
            .patch
            .checked_add(1)
            .ok_or(VersionError::PatchOverflow(self))?;
        Ok(Self { patch, ..self })
    }

    /// Parse an operator-supplied `MAJOR.MINOR` string.
    ///
    /// Explicit versions always start at patch zero.
    pub fn from_major_minor(explicit: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidOverride(explicit.to_string());
        let (major, minor) = explicit.trim().split_once('.').ok_or_else(invalid)?;
        let major = parse_component(major).ok_or_else(invalid)?;
        let minor = parse_component(minor).ok_or_else(invalid)?;
        Ok(Self::new(major, minor, 0))
    }
}

fn parse_component(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

/// Parse raw tag strings into ascending, de-duplicated versions.
///
/// Tags that are not plain versions (`latest`, `<none>`, `1.0.0-rc1`) are
/// dropped.
pub fn sorted_versions<'a, I>(tags: I) -> Vec<Version>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut versions: Vec<Version> = tags
        .into_iter()
        .filter_map(|t| Version::parse(t).ok())
        .collect();
    versions.sort();
    versions.dedup();
    versions
}

/// An image name paired with a release version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageTag {
    pub image: String,
    pub version: Version,
}

impl ImageTag {
    pub fn new(image: &str, version: Version) -> Self {
        Self {
            image: image.to_string(),
            version,
        }
    }

    /// Docker reference form, `image:MAJOR.MINOR.PATCH`.
    pub fn reference(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.image, self.version)
    }
}
