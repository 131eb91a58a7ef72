//! Exclude patterns shared by snapshot and restore.
//!
//! A pattern without `/` matches any path component, so `logs` excludes
//! every `logs` entry at any depth. A pattern containing `/` (or starting
//! with one) is anchored at the tree root and excludes that path and
//! everything below it. `*` and `?` glob within a single component.

use std::path::{Component, Path};

use regex::Regex;

use crate::error::{SnapshotError, SnapshotResult};

#[derive(Debug, Clone)]
struct Pattern {
    anchored: bool,
    components: Vec<Regex>,
}

impl Pattern {
    fn parse(raw: &str) -> SnapshotResult<Option<Self>> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
        let anchored_root = trimmed.starts_with('/');
        let body = trimmed.trim_matches('/');
        if body.is_empty() {
            return Ok(None);
        }

        let components = body
            .split('/')
            .filter(|c| !c.is_empty())
            .map(|c| {
                Regex::new(&glob_to_regex(c)).map_err(|source| SnapshotError::Pattern {
                    pattern: raw.to_string(),
                    source,
                })
            })
            .collect::<SnapshotResult<Vec<_>>>()?;

        Ok(Some(Self {
            anchored: anchored_root || components.len() > 1,
            components,
        }))
    }

    fn matches(&self, parts: &[String]) -> bool {
        if self.anchored {
            parts.len() >= self.components.len()
                && self
                    .components
                    .iter()
                    .zip(parts)
                    .all(|(re, part)| re.is_match(part))
        } else {
            let re = &self.components[0];
            parts.iter().any(|part| re.is_match(part))
        }
    }
}

/// The exclusion set applied in both mirror directions.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    raw: Vec<String>,
    patterns: Vec<Pattern>,
}

impl ExcludeSet {
    pub fn new<I, S>(patterns: I) -> SnapshotResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for raw in patterns {
            let raw = raw.as_ref();
            if let Some(pattern) = Pattern::parse(raw)? {
                set.raw.push(raw.to_string());
                set.patterns.push(pattern);
            }
        }
        Ok(set)
    }

    /// Whether `relative` (a path relative to the tree root) is excluded.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            return false;
        }
        self.patterns.iter().any(|p| p.matches(&parts))
    }

    pub fn patterns(&self) -> &[String] {
        &self.raw
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(patterns: &[&str]) -> ExcludeSet {
        ExcludeSet::new(patterns.iter().copied()).unwrap()
    }

    #[test]
    fn bare_name_matches_any_depth() {
        let excludes = set(&["logs"]);
        assert!(excludes.is_excluded(Path::new("logs")));
        assert!(excludes.is_excluded(Path::new("logs/app.log")));
        assert!(excludes.is_excluded(Path::new("apps/core/logs/debug.log")));
        assert!(!excludes.is_excluded(Path::new("logsearch/main.py")));
        assert!(!excludes.is_excluded(Path::new("apps/core/views.py")));
    }

    #[test]
    fn dotfiles() {
        let excludes = set(&[".env", ".git"]);
        assert!(excludes.is_excluded(Path::new(".env")));
        assert!(excludes.is_excluded(Path::new(".git/HEAD")));
        assert!(!excludes.is_excluded(Path::new(".envrc")));
        assert!(!excludes.is_excluded(Path::new(".gitignore")));
    }

    #[test]
    fn anchored_paths() {
        let excludes = set(&["apps/media", "/static/"]);
        assert!(excludes.is_excluded(Path::new("apps/media/avatar.png")));
        assert!(!excludes.is_excluded(Path::new("other/apps/media/avatar.png")));
        assert!(excludes.is_excluded(Path::new("static/app.css")));
        assert!(!excludes.is_excluded(Path::new("apps/static/app.css")));
    }

    #[test]
    fn globs_stay_within_a_component() {
        let excludes = set(&["*.pyc", "cache-?"]);
        assert!(excludes.is_excluded(Path::new("apps/core/__init__.pyc")));
        assert!(excludes.is_excluded(Path::new("cache-1/blob")));
        assert!(!excludes.is_excluded(Path::new("cache-10/blob")));
        assert!(!excludes.is_excluded(Path::new("apps/core/models.py")));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let excludes = set(&["a+b(1).txt"]);
        assert!(excludes.is_excluded(Path::new("a+b(1).txt")));
        assert!(!excludes.is_excluded(Path::new("aab1.txt")));
    }

    #[test]
    fn empty_patterns_are_ignored() {
        let excludes = set(&["", "/", "  "]);
        assert!(excludes.patterns().is_empty());
        assert!(!excludes.is_excluded(Path::new("anything")));
    }
}
