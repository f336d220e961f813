//! File system utilities.

use crate::Result;
use fd_lock::RwLock;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string())
}

/// Sibling file holding the advisory lock for `path`.
pub fn lock_path(path: &Path) -> PathBuf {
    path.with_file_name(format!("{}.lock", file_name(path)))
}

/// Open the advisory lock guarding `path`.
///
/// The lock sits on a sibling file because `write_atomic` replaces the
/// target's inode on every write.
pub fn open_lock(path: &Path) -> Result<RwLock<fs::File>> {
    ensure_parent(path)?;
    let file = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path(path))?;
    Ok(RwLock::new(file))
}

/// Write a file atomically: write a sibling temp file, fsync, then rename over the target.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name(path), Uuid::new_v4()));

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

/// Check that a file exists and is a regular file.
pub fn ensure_file(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(crate::Error::other(format!("Path not found: {}", path.display())));
    }
    if !path.is_file() {
        return Err(crate::Error::other(format!("Not a file: {}", path.display())));
    }
    Ok(())
}
