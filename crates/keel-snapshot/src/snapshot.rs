//! Snapshotter — mirrored copies of a working tree.
//!
//! `snapshot` replaces the backup directory with a fresh mirror of the
//! source. `restore` mirrors the backup back onto the target and deletes
//! anything the backup does not contain. Both directions use the same
//! [`ExcludeSet`], held by the `Snapshotter`, so excluded runtime paths
//! (logs, uploaded media, secrets) are never copied and never deleted.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use keel_core::paths;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::error::{SnapshotError, SnapshotResult};
use crate::exclude::ExcludeSet;

/// Counters for a completed snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    pub files: u64,
    pub dirs: u64,
    pub bytes: u64,
}

/// Counters for a completed restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreStats {
    pub copied: u64,
    pub unchanged: u64,
    pub removed: u64,
}

#[derive(Debug, Clone)]
pub struct Snapshotter {
    excludes: ExcludeSet,
}

impl Snapshotter {
    pub fn new(excludes: ExcludeSet) -> Self {
        Self { excludes }
    }

    pub fn excludes(&self) -> &ExcludeSet {
        &self.excludes
    }

    /// Replace `dest` with a mirror of `source`.
    pub fn snapshot(&self, source: &Path, dest: &Path) -> SnapshotResult<SnapshotStats> {
        if !source.is_dir() {
            return Err(SnapshotError::SourceMissing(source.to_path_buf()));
        }
        if paths::encloses(dest, source) {
            return Err(SnapshotError::Overlap {
                tree: source.to_path_buf(),
                backup: dest.to_path_buf(),
            });
        }
        if fs::symlink_metadata(dest).is_ok() {
            remove_any(dest)?;
            debug!(path = ?dest, "previous snapshot removed");
        }
        fs::create_dir_all(dest).map_err(SnapshotError::io(dest))?;
        let own_dir = canonical(dest);

        let mut stats = SnapshotStats::default();
        let walker = WalkDir::new(source)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !self.skip(source, e, own_dir.as_deref()));

        for entry in walker {
            let entry = entry?;
            let rel = relative(source, entry.path());
            let to = dest.join(rel);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                fs::create_dir_all(&to).map_err(SnapshotError::io(&to))?;
                stats.dirs += 1;
            } else if file_type.is_symlink() {
                copy_symlink(entry.path(), &to)?;
                stats.files += 1;
            } else {
                stats.bytes += fs::copy(entry.path(), &to).map_err(SnapshotError::io(&to))?;
                stats.files += 1;
            }
        }

        info!(
            source = ?source,
            dest = ?dest,
            files = stats.files,
            dirs = stats.dirs,
            bytes = stats.bytes,
            "snapshot taken"
        );
        Ok(stats)
    }

    /// Mirror `snapshot` onto `target`, deleting non-excluded extras.
    pub fn restore(&self, snapshot: &Path, target: &Path) -> SnapshotResult<RestoreStats> {
        if !snapshot.is_dir() {
            return Err(SnapshotError::MissingSnapshot(snapshot.to_path_buf()));
        }
        if paths::encloses(snapshot, target) {
            return Err(SnapshotError::Overlap {
                tree: target.to_path_buf(),
                backup: snapshot.to_path_buf(),
            });
        }
        fs::create_dir_all(target).map_err(SnapshotError::io(target))?;
        let own_dir = canonical(snapshot);
        let mut stats = RestoreStats::default();

        // Pass 1: bring every snapshot entry into the target.
        let walker = WalkDir::new(snapshot)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !self.excludes.is_excluded(relative(snapshot, e.path())));

        for entry in walker {
            let entry = entry?;
            let rel = relative(snapshot, entry.path());
            let to = target.join(rel);
            let file_type = entry.file_type();
            let existing = fs::symlink_metadata(&to).ok();

            if file_type.is_dir() {
                if existing.as_ref().is_some_and(|m| !m.is_dir()) {
                    remove_any(&to)?;
                }
                fs::create_dir_all(&to).map_err(SnapshotError::io(&to))?;
            } else if file_type.is_symlink() {
                if let Some(meta) = &existing {
                    self.clear(target, &to, meta, own_dir.as_deref())?;
                }
                copy_symlink(entry.path(), &to)?;
                stats.copied += 1;
            } else {
                match existing {
                    Some(meta) if meta.is_file() && same_contents(entry.path(), &to)? => {
                        stats.unchanged += 1;
                    }
                    Some(meta) => {
                        self.clear(target, &to, &meta, own_dir.as_deref())?;
                        fs::copy(entry.path(), &to).map_err(SnapshotError::io(&to))?;
                        stats.copied += 1;
                    }
                    None => {
                        fs::copy(entry.path(), &to).map_err(SnapshotError::io(&to))?;
                        stats.copied += 1;
                    }
                }
            }
        }

        // Pass 2: drop target entries the snapshot does not have.
        let mut extra_dirs: Vec<PathBuf> = Vec::new();
        let walker = WalkDir::new(target)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !self.skip(target, e, own_dir.as_deref()));

        for entry in walker {
            let entry = entry?;
            let rel = relative(target, entry.path());
            if fs::symlink_metadata(snapshot.join(rel)).is_ok() {
                continue;
            }
            if entry.file_type().is_dir() {
                // Excluded children may live below; decide after the walk.
                extra_dirs.push(entry.path().to_path_buf());
            } else {
                fs::remove_file(entry.path()).map_err(SnapshotError::io(entry.path()))?;
                stats.removed += 1;
            }
        }

        // Children were discovered after parents, so reverse is bottom-up.
        for dir in extra_dirs.iter().rev() {
            match fs::remove_dir(dir) {
                Ok(()) => stats.removed += 1,
                Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => {
                    debug!(path = ?dir, "keeping directory with excluded contents");
                }
                Err(e) => return Err(SnapshotError::io(dir)(e)),
            }
        }

        info!(
            snapshot = ?snapshot,
            target = ?target,
            copied = stats.copied,
            unchanged = stats.unchanged,
            removed = stats.removed,
            "snapshot restored"
        );
        Ok(stats)
    }

    /// Remove `path` from the target so a snapshot entry can take its
    /// place. Directories are emptied of everything but excluded content;
    /// if any remains the entry cannot be placed.
    fn clear(
        &self,
        root: &Path,
        path: &Path,
        meta: &fs::Metadata,
        own_dir: Option<&Path>,
    ) -> SnapshotResult<()> {
        if !meta.is_dir() {
            return fs::remove_file(path).map_err(SnapshotError::io(path));
        }

        let mut dirs: Vec<PathBuf> = Vec::new();
        let walker = WalkDir::new(path)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !self.skip(root, e, own_dir));
        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_dir() {
                dirs.push(entry.path().to_path_buf());
            } else {
                fs::remove_file(entry.path()).map_err(SnapshotError::io(entry.path()))?;
            }
        }
        for dir in dirs.iter().rev() {
            match fs::remove_dir(dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => {}
                Err(e) => return Err(SnapshotError::io(dir)(e)),
            }
        }

        if fs::symlink_metadata(path).is_ok() {
            return Err(SnapshotError::ExcludedContent(path.to_path_buf()));
        }
        Ok(())
    }

    /// Excluded paths, plus the snapshot directory itself when it lives
    /// inside the tree being walked.
    fn skip(&self, root: &Path, entry: &DirEntry, own_dir: Option<&Path>) -> bool {
        if self.excludes.is_excluded(relative(root, entry.path())) {
            return true;
        }
        match own_dir {
            Some(own) if entry.file_type().is_dir() => {
                canonical(entry.path()).as_deref() == Some(own)
            }
            _ => false,
        }
    }
}

fn relative<'a>(root: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

fn canonical(path: &Path) -> Option<PathBuf> {
    fs::canonicalize(path).ok()
}

fn remove_any(path: &Path) -> SnapshotResult<()> {
    let meta = fs::symlink_metadata(path).map_err(SnapshotError::io(path))?;
    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(SnapshotError::io(path))
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> SnapshotResult<()> {
    let link = fs::read_link(from).map_err(SnapshotError::io(from))?;
    std::os::unix::fs::symlink(&link, to).map_err(SnapshotError::io(to))
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> SnapshotResult<()> {
    fs::copy(from, to).map_err(SnapshotError::io(to))?;
    Ok(())
}

fn same_contents(a: &Path, b: &Path) -> SnapshotResult<bool> {
    let len_a = fs::metadata(a).map_err(SnapshotError::io(a))?.len();
    let len_b = fs::metadata(b).map_err(SnapshotError::io(b))?.len();
    if len_a != len_b {
        return Ok(false);
    }
    Ok(file_digest(a)? == file_digest(b)?)
}

fn file_digest(path: &Path) -> SnapshotResult<String> {
    let mut file = File::open(path).map_err(SnapshotError::io(path))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(SnapshotError::io(path))?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn snapshotter() -> Snapshotter {
        Snapshotter::new(ExcludeSet::new(["logs", "static", "media", ".env", ".git"]).unwrap())
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Relative path → file contents (directories map to `<dir>`).
    fn tree(root: &Path) -> BTreeMap<String, String> {
        WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .map(|e| e.unwrap())
            .map(|e| {
                let rel = e.path().strip_prefix(root).unwrap().to_string_lossy().into_owned();
                let content = if e.file_type().is_dir() {
                    "<dir>".to_string()
                } else {
                    fs::read_to_string(e.path()).unwrap()
                };
                (rel, content)
            })
            .collect()
    }

    fn project(root: &Path) {
        write(root, "manage.py", "main");
        write(root, "apps/core/views.py", "views v1");
        write(root, "apps/users/models.py", "models v1");
        write(root, "logs/app.log", "log line 1");
        write(root, "media/avatar.png", "png");
        write(root, ".env", "SECRET=1");
        write(root, ".git/HEAD", "ref: main");
    }

    #[test]
    fn snapshot_omits_excluded_paths() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app");
        let dest = dir.path().join("backup");
        project(&source);

        let stats = snapshotter().snapshot(&source, &dest).unwrap();
        assert_eq!(stats.files, 3);

        let copied = tree(&dest);
        assert!(copied.contains_key("manage.py"));
        assert!(copied.contains_key("apps/core/views.py"));
        for excluded in ["logs", "media", ".env", ".git"] {
            assert!(!copied.contains_key(excluded), "{excluded} leaked into snapshot");
        }
    }

    #[test]
    fn snapshot_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app");
        let dest = dir.path().join("backup");
        project(&source);
        let snap = snapshotter();

        snap.snapshot(&source, &dest).unwrap();
        let first = tree(&dest);
        snap.snapshot(&source, &dest).unwrap();
        assert_eq!(tree(&dest), first);
    }

    #[test]
    fn snapshot_replaces_stale_backup() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app");
        let dest = dir.path().join("backup");
        project(&source);
        write(&dest, "stale.txt", "old");

        snapshotter().snapshot(&source, &dest).unwrap();
        assert!(!dest.join("stale.txt").exists());
    }

    #[test]
    fn restore_reproduces_tree_and_keeps_excluded_paths() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app");
        let dest = dir.path().join("backup");
        project(&source);
        let snap = snapshotter();
        let before = tree(&source);

        snap.snapshot(&source, &dest).unwrap();

        // Simulate a bad release plus runtime activity.
        write(&source, "apps/core/views.py", "views v2");
        fs::remove_file(source.join("apps/users/models.py")).unwrap();
        write(&source, "apps/new_module.py", "new");
        write(&source, "migrations/0002.py", "new migration");
        write(&source, "logs/app.log", "log line 2");
        write(&source, "media/upload.png", "uploaded");

        let stats = snap.restore(&dest, &source).unwrap();
        assert!(stats.copied >= 2);
        assert!(stats.removed >= 3);

        let after = tree(&source);
        assert_eq!(after["apps/core/views.py"], "views v1");
        assert_eq!(after["apps/users/models.py"], "models v1");
        assert!(!after.contains_key("apps/new_module.py"));
        assert!(!after.contains_key("migrations"));

        // Excluded paths keep their current target state.
        assert_eq!(after["logs/app.log"], "log line 2");
        assert_eq!(after["media/upload.png"], "uploaded");
        assert_eq!(after[".env"], "SECRET=1");

        let not_excluded = |m: &BTreeMap<String, String>| -> BTreeMap<String, String> {
            m.iter()
                .filter(|(k, _)| !snap.excludes().is_excluded(Path::new(k.as_str())))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        assert_eq!(not_excluded(&after), not_excluded(&before));
    }

    #[test]
    fn restore_keeps_dirs_holding_excluded_children() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app");
        let dest = dir.path().join("backup");
        project(&source);
        let snap = snapshotter();
        snap.snapshot(&source, &dest).unwrap();

        write(&source, "plugins/logs/plugin.log", "keep me");
        write(&source, "plugins/extra.py", "drop me");

        snap.restore(&dest, &source).unwrap();
        assert!(source.join("plugins/logs/plugin.log").exists());
        assert!(!source.join("plugins/extra.py").exists());
    }

    #[test]
    fn restore_leaves_unchanged_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app");
        let dest = dir.path().join("backup");
        project(&source);
        let snap = snapshotter();
        snap.snapshot(&source, &dest).unwrap();

        let stats = snap.restore(&dest, &source).unwrap();
        assert_eq!(stats.copied, 0);
        assert_eq!(stats.removed, 0);
        assert_eq!(stats.unchanged, 3);
    }

    #[test]
    fn restore_replaces_file_with_directory() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app");
        let dest = dir.path().join("backup");
        project(&source);
        let snap = snapshotter();
        snap.snapshot(&source, &dest).unwrap();

        fs::remove_dir_all(source.join("apps/core")).unwrap();
        write(&source, "apps/core", "now a file");

        snap.restore(&dest, &source).unwrap();
        assert_eq!(
            fs::read_to_string(source.join("apps/core/views.py")).unwrap(),
            "views v1"
        );
    }

    #[test]
    fn restore_keeps_excluded_content_where_a_file_belongs() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app");
        let dest = dir.path().join("backup");
        project(&source);
        write(&source, "uploads", "placeholder");
        let snap = snapshotter();
        snap.snapshot(&source, &dest).unwrap();

        fs::remove_file(source.join("uploads")).unwrap();
        write(&source, "uploads/media/avatar.png", "user data");
        write(&source, "uploads/thumbs.db", "cache");

        let err = snap.restore(&dest, &source).unwrap_err();
        assert!(matches!(err, SnapshotError::ExcludedContent(_)));
        assert_eq!(
            fs::read_to_string(source.join("uploads/media/avatar.png")).unwrap(),
            "user data"
        );
        assert!(!source.join("uploads/thumbs.db").exists());
    }

    #[test]
    fn restore_replaces_directory_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app");
        let dest = dir.path().join("backup");
        project(&source);
        let snap = snapshotter();
        snap.snapshot(&source, &dest).unwrap();

        fs::remove_file(source.join("manage.py")).unwrap();
        write(&source, "manage.py/nested/stray.py", "stray");

        snap.restore(&dest, &source).unwrap();
        assert_eq!(fs::read_to_string(source.join("manage.py")).unwrap(), "main");
    }

    #[test]
    fn backup_overlapping_source_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("srv/app");
        project(&source);
        let snap = snapshotter();

        for dest in [source.join("."), dir.path().join("srv"), dir.path().join("srv/app/../app")] {
            let err = snap.snapshot(&source, &dest).unwrap_err();
            assert!(matches!(err, SnapshotError::Overlap { .. }), "{dest:?}");
        }
        assert_eq!(fs::read_to_string(source.join("manage.py")).unwrap(), "main");

        let err = snap.restore(&dir.path().join("srv"), &source).unwrap_err();
        assert!(matches!(err, SnapshotError::Overlap { .. }));
        assert!(source.join("apps/core/views.py").exists());
    }

    #[test]
    fn restore_without_snapshot_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = snapshotter()
            .restore(&dir.path().join("missing"), dir.path())
            .unwrap_err();
        assert!(matches!(err, SnapshotError::MissingSnapshot(_)));
    }

    #[test]
    fn snapshot_inside_source_is_not_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app");
        project(&source);
        let dest = source.join(".backup");
        let snap = snapshotter();

        snap.snapshot(&source, &dest).unwrap();
        assert!(!dest.join(".backup").exists());

        write(&source, "junk.txt", "junk");
        snap.restore(&dest, &source).unwrap();
        assert!(!source.join("junk.txt").exists());
        assert!(dest.join("manage.py").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app");
        let dest = dir.path().join("backup");
        project(&source);
        std::os::unix::fs::symlink("manage.py", source.join("entry.py")).unwrap();

        snapshotter().snapshot(&source, &dest).unwrap();
        let link = fs::read_link(dest.join("entry.py")).unwrap();
        assert_eq!(link, PathBuf::from("manage.py"));
    }

    #[test]
    fn missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = snapshotter()
            .snapshot(&dir.path().join("nope"), &dir.path().join("backup"))
            .unwrap_err();
        assert!(matches!(err, SnapshotError::SourceMissing(_)));
    }
}
