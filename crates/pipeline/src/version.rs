//! Content-derived service versions.
//!
//! A service inside a clean git checkout is versioned by its commit; anything else by a
//! hash of its files, so an unchanged tree always maps to the same image tag.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use forge_engine::{ForgeError, RunOptions, Workstream};
use forge_types::Command;
use forge_util::find_ancestor_with;
use sha2::{Digest, Sha256};

const GIT_DIR: &str = ".git";

/// Whether `path` lies inside a git working tree.
pub fn is_git(path: &Path) -> bool {
    find_ancestor_with(path, GIT_DIR).is_some()
}

/// `<commit>.git` for a clean checkout, `<content hash>.ephemeral` otherwise.
pub async fn service_version(workstream: &Workstream, root: &Path) -> Result<String, ForgeError> {
    if is_git(root) {
        let diff = workstream
            .run(
                &Command::new("git").args(["diff", "--quiet", "."]),
                RunOptions::default().cwd(root).expect_codes([1]).hidden(),
            )
            .await?;
        if diff.code == 0 {
            let head = workstream
                .run(&Command::new("git").args(["rev-parse", "HEAD"]), RunOptions::default().cwd(root))
                .await?;
            return Ok(format!("{}.git", head.output.trim()));
        }
    }

    let owned = root.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || shadir(&owned))
        .await?
        .map_err(|error| ForgeError::io(format!("hash {}", root.display()), error))?;
    Ok(format!("{digest}.ephemeral"))
}

/// Hex SHA-256 over the sorted relative paths and contents of every file under `root`,
/// excluding `.git`. Symlinks contribute their target path and are not followed.
pub fn shadir(root: &Path) -> io::Result<String> {
    let mut files = Vec::new();
    let mut pending = vec![PathBuf::new()];
    while let Some(relative) = pending.pop() {
        for entry in fs::read_dir(root.join(&relative))? {
            let entry = entry?;
            if entry.file_name() == GIT_DIR {
                continue;
            }
            let path = relative.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();

    let mut hasher = Sha256::new();
    for relative in &files {
        let absolute = root.join(relative);
        hasher.update(relative.to_string_lossy().replace('\\', "/").as_bytes());
        hasher.update([0u8]);
        if fs::symlink_metadata(&absolute)?.file_type().is_symlink() {
            hasher.update(fs::read_link(&absolute)?.to_string_lossy().as_bytes());
        } else {
            hasher.update(fs::read(&absolute)?);
        }
        hasher.update([0u8]);
    }
    Ok(hex::encode(hasher.finalize()))
}
