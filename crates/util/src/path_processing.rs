//! Path helpers.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use dirs_next::home_dir;

/// Expands a leading `~` to the current user's home directory.
///
/// Only the bare `~` and `~/...` (or `~\...`) forms are expanded; `~user` and paths without a
/// tilde are returned trimmed but otherwise unchanged, as is everything when no home
/// directory is known.
pub fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    let Some(rest) = trimmed.strip_prefix('~') else {
        return PathBuf::from(trimmed);
    };
    let relative = match rest.chars().next() {
        None => "",
        Some('/' | '\\') => &rest[1..],
        Some(_) => return PathBuf::from(trimmed),
    };
    match home_dir() {
        Some(home) if relative.is_empty() => home,
        Some(home) => home.join(relative),
        None => PathBuf::from(trimmed),
    }
}

/// Walks from `start` toward the filesystem root and returns the first directory that
/// contains an entry named `marker`.
///
/// The walk is iterative. It stops at the root, and it stops early if a directory is
/// reached twice (symlink loops make canonical paths repeat).
pub fn find_ancestor_with(start: &Path, marker: &str) -> Option<PathBuf> {
    let mut visited = HashSet::new();
    let mut current = Some(start.to_path_buf());

    while let Some(dir) = current {
        let canonical = dir.canonicalize().unwrap_or_else(|_| dir.clone());
        if !visited.insert(canonical) {
            return None;
        }
        if dir.join(marker).exists() {
            return Some(dir);
        }
        current = dir.parent().filter(|parent| !parent.as_os_str().is_empty()).map(Path::to_path_buf);
    }

    None
}
