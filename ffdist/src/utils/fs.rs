//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path) and
//! keep directory listings in a deterministic order.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all_with_op(op: &'static str, path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| io_error(op, path, e))
}

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_error(op, path, e))
}

/// Remove a file, treating "already gone" as success.
///
/// Returns whether a file was actually removed.
pub async fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error("removing file", path, e)),
    }
}

/// List regular files directly inside `dir`, sorted by file name.
///
/// A missing directory yields an empty list.
pub async fn list_files_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error("listing directory", dir, e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| io_error("listing directory", dir, e))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| io_error("reading file type", &entry.path(), e))?;
        if file_type.is_file() {
            files.push(entry.path());
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Make `path` absolute against the current directory without touching the
/// filesystem.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| io_error("resolving path", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_list_files_sorted_by_name() {
        let temp = TempDir::new().unwrap();
        for name in ["00000002.mkv", "00000000.mkv", "00000010.mkv", "00000001.mkv"] {
            std::fs::write(temp.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(temp.path().join("nested")).unwrap();

        let files = list_files_sorted(temp.path()).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["00000000.mkv", "00000001.mkv", "00000002.mkv", "00000010.mkv"]
        );
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let files = list_files_sorted(&temp.path().join("missing")).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_remove_file_if_exists() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("partial.mkv");
        std::fs::write(&file, b"partial").unwrap();

        assert!(remove_file_if_exists(&file).await.unwrap());
        assert!(!file.exists());
        assert!(!remove_file_if_exists(&file).await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_dir_creates_nested_directories() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        ensure_dir_all_with_op("creating directory", &nested)
            .await
            .unwrap();
        assert!(nested.is_dir());
    }
}
