//! Async local-filesystem helpers used by discovery and publish.
//!
//! Everything here is read-mostly: discovery only lists directories, and
//! the single mutating primitive is [`publish_dir`], the atomic rename
//! that moves a fully-built staging directory to its canonical location.
//! Keeping that rename as the only publish path is what makes a partition
//! either fully present or fully absent to the next discovery pass, even
//! across crashes.

use std::collections::BTreeSet;
use std::io;
use std::path::Path;

use snafu::{Backtrace, IntoError, prelude::*};
use tokio::fs;

use crate::layout;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors from filesystem operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The path does not exist.
    #[snafu(display("path not found: {path}"))]
    NotFound {
        /// The path that was not found.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
        /// Backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// Any other I/O failure.
    #[snafu(display("I/O error at {path}: {source}"))]
    OtherIo {
        /// The path where the failure occurred.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
        /// Backtrace captured when the error occurred.
        backtrace: Backtrace,
    },
}

fn classify(path: &Path, e: io::Error) -> StorageError {
    let path = path.display().to_string();
    if e.kind() == io::ErrorKind::NotFound {
        NotFoundSnafu { path }.into_error(e)
    } else {
        OtherIoSnafu { path }.into_error(e)
    }
}

/// List the subdirectory names of `path`, sorted.
///
/// Only directory entries count: stray files, symlinks to files, and other
/// filesystem entries are skipped, as are reserved (`_`/`.`-prefixed) and
/// non-UTF-8 names, none of which can be partition keys. A missing
/// directory is `StorageError::NotFound`, which discovery treats as fatal.
pub async fn list_dir_names(path: &Path) -> StorageResult<BTreeSet<String>> {
    let mut entries = fs::read_dir(path).await.map_err(|e| classify(path, e))?;

    let mut names = BTreeSet::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => return Err(classify(path, e)),
        };

        let file_type = entry
            .file_type()
            .await
            .map_err(|e| classify(&entry.path(), e))?;
        if !file_type.is_dir() {
            continue;
        }

        // Non-UTF-8 names cannot have been produced by a granularity's
        // key mapping, so they cannot match anything on the other side.
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if layout::is_reserved_name(&name) {
            continue;
        }
        names.insert(name);
    }

    Ok(names)
}

/// Whether `path` exists and is a directory.
pub async fn dir_exists(path: &Path) -> StorageResult<bool> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_dir()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(OtherIoSnafu {
            path: path.display().to_string(),
        }
        .into_error(e)),
    }
}

/// Create `path` and any missing parents.
pub async fn ensure_dir(path: &Path) -> StorageResult<()> {
    fs::create_dir_all(path).await.context(OtherIoSnafu {
        path: path.display().to_string(),
    })
}

/// Remove a directory tree.
pub async fn remove_dir_tree(path: &Path) -> StorageResult<()> {
    fs::remove_dir_all(path)
        .await
        .map_err(|e| classify(path, e))
}

/// Remove a directory tree, swallowing errors.
///
/// Used on failure paths where we are already reporting another error and
/// the leftover staging directory is invisible to discovery anyway.
pub async fn remove_dir_tree_best_effort(path: &Path) {
    let _ = fs::remove_dir_all(path).await;
}

/// Atomically publish a staging directory at its canonical location.
///
/// This is a plain rename: on the same filesystem it either fully succeeds
/// or leaves `dest` untouched. The destination must not already exist.
pub async fn publish_dir(staging: &Path, dest: &Path) -> StorageResult<()> {
    fs::rename(staging, dest)
        .await
        .map_err(|e| classify(dest, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn lists_only_subdirectories() -> TestResult {
        let tmp = TempDir::new()?;
        std::fs::create_dir(tmp.path().join("2024-03-14"))?;
        std::fs::create_dir(tmp.path().join("2024-03-15"))?;
        std::fs::write(tmp.path().join("_SUCCESS"), b"")?;
        std::fs::write(tmp.path().join("notes.txt"), b"stray")?;

        let names = list_dir_names(tmp.path()).await?;
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        assert_eq!(names, ["2024-03-14", "2024-03-15"]);
        Ok(())
    }

    #[tokio::test]
    async fn skips_reserved_directories() -> TestResult {
        let tmp = TempDir::new()?;
        std::fs::create_dir(tmp.path().join("2024-03-14"))?;
        std::fs::create_dir(tmp.path().join("_staging"))?;
        std::fs::create_dir(tmp.path().join(".cache"))?;

        let names = list_dir_names(tmp.path()).await?;
        assert_eq!(names.len(), 1);
        assert!(names.contains("2024-03-14"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_directory_is_not_found() -> TestResult {
        let tmp = TempDir::new()?;
        let err = list_dir_names(&tmp.path().join("absent"))
            .await
            .expect_err("expected NotFound");
        assert!(matches!(err, StorageError::NotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn dir_exists_distinguishes_dirs_from_files() -> TestResult {
        let tmp = TempDir::new()?;
        let dir = tmp.path().join("present");
        std::fs::create_dir(&dir)?;
        let file = tmp.path().join("a-file");
        std::fs::write(&file, b"x")?;

        assert!(dir_exists(&dir).await?);
        assert!(!dir_exists(&file).await?);
        assert!(!dir_exists(&tmp.path().join("absent")).await?);
        Ok(())
    }

    #[tokio::test]
    async fn publish_moves_staging_to_dest() -> TestResult {
        let tmp = TempDir::new()?;
        let staging = tmp.path().join("_staging").join("2024-03-14");
        std::fs::create_dir_all(&staging)?;
        std::fs::write(staging.join("part-0"), b"payload")?;

        let dest = tmp.path().join("2024-03-14");
        publish_dir(&staging, &dest).await?;

        assert!(!staging.exists());
        assert_eq!(std::fs::read(dest.join("part-0"))?, b"payload");
        Ok(())
    }
}
