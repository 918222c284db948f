//! On-disk artifact caches kept per config id.
//!
//! Layout: `<root>/{cache,cacheAdapt,cacheOverlay}/<config id>`. The
//! coordinator does not own these directories; it only removes them when a
//! workload is deleted or when they outlive every active config at shutdown.

use crate::model::ConfigId;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

pub const CACHE_DIRS: [&str; 3] = ["cache", "cacheAdapt", "cacheOverlay"];

/// Removes every cache directory for `config_id`. Missing directories are fine.
pub fn clean_config_dirs(root: &Path, config_id: &ConfigId) {
    for dir in CACHE_DIRS {
        let path = root.join(dir).join(config_id.as_str());
        match fs::remove_dir_all(&path) {
            Ok(()) => debug!(path = %path.display(), "Removed cache directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove cache directory"),
        }
    }
}

/// Removes cache directories whose config id is not in `active`. Returns the
/// number of directories removed.
pub fn clean_stale(root: &Path, active: &HashSet<ConfigId>) -> usize {
    let mut removed = 0;
    for dir in CACHE_DIRS {
        let parent = root.join(dir);
        let entries = match fs::read_dir(&parent) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => {
                warn!(path = %parent.display(), error = %e, "Cannot list cache directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if active.contains(&ConfigId::from(name)) {
                continue;
            }
            let path = entry.path();
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed stale cache directory");
                    removed += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale cache"),
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(root: &Path, dir: &str, id: &str) {
        let path = root.join(dir).join(id);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("artifact.bin"), b"x").unwrap();
    }

    #[test]
    fn removes_all_dirs_for_one_config() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path(), "cache", "42");
        seed(tmp.path(), "cacheOverlay", "42");
        seed(tmp.path(), "cache", "7");

        clean_config_dirs(tmp.path(), &ConfigId::from("42"));
        assert!(!tmp.path().join("cache/42").exists());
        assert!(!tmp.path().join("cacheOverlay/42").exists());
        assert!(tmp.path().join("cache/7").exists());
    }

    #[test]
    fn stale_cleanup_keeps_active_configs() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path(), "cache", "1");
        seed(tmp.path(), "cacheAdapt", "2");
        seed(tmp.path(), "cacheAdapt", "3");

        let active: HashSet<ConfigId> = [ConfigId::from("1")].into_iter().collect();
        assert_eq!(clean_stale(tmp.path(), &active), 2);
        assert!(tmp.path().join("cache/1").exists());
        assert!(!tmp.path().join("cacheAdapt/2").exists());
    }

    #[test]
    fn missing_root_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("nowhere");
        clean_config_dirs(&root, &ConfigId::from("1"));
        assert_eq!(clean_stale(&root, &HashSet::new()), 0);
    }
}
