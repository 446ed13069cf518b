//! On-disk layout conventions for the slice and index trees.
//!
//! This module centralizes every path convention the orchestrator relies
//! on, so the rest of the crate never concatenates path strings by hand:
//!
//! ```text
//! <indexes_root>/<granularity>/<key>/            one subtree per built index
//! <dataset_parent>/slice/<granularity>/<key>/    one subtree per sliced partition
//! <index_home>/_staging/<key>/                   in-flight build, not yet published
//! ```
//!
//! Partition keys are identical strings in both trees; that exact match is
//! what reconciliation keys on. Names starting with `_` or `.` are
//! reserved for orchestrator bookkeeping (the staging directory lives under
//! one) and are never valid partition keys; discovery skips them.

use std::path::{Path, PathBuf};

use crate::granularity::Granularity;

/// Directory under the dataset's parent holding all sliced partitions.
pub const SLICE_DIR_NAME: &str = "slice";

/// Reserved directory under an index home where in-flight builds land
/// before being atomically published.
pub const STAGING_DIR_NAME: &str = "_staging";

/// Root of the slice tree for a dataset: `<dataset_parent>/slice`.
///
/// The slicing collaborator is handed this path and creates one
/// granularity directory beneath it.
pub fn slice_root(dataset: &Path) -> PathBuf {
    dataset
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(SLICE_DIR_NAME)
}

/// Slice home for one granularity: `<dataset_parent>/slice/<granularity>`.
pub fn slice_home(dataset: &Path, granularity: Granularity) -> PathBuf {
    slice_root(dataset).join(granularity.dir_name())
}

/// Index home for one granularity: `<indexes_root>/<granularity>`.
pub fn index_home(indexes_root: &Path, granularity: Granularity) -> PathBuf {
    indexes_root.join(granularity.dir_name())
}

/// Location of one sliced partition: `<slice_home>/<key>`.
pub fn slice_partition(slice_home: &Path, key: &str) -> PathBuf {
    slice_home.join(key)
}

/// Canonical location of one built index: `<index_home>/<key>`.
pub fn index_partition(index_home: &Path, key: &str) -> PathBuf {
    index_home.join(key)
}

/// Staging root for in-flight builds under an index home.
pub fn staging_dir(index_home: &Path) -> PathBuf {
    index_home.join(STAGING_DIR_NAME)
}

/// Staging location for one in-flight build: `<index_home>/_staging/<key>`.
pub fn staging_partition(index_home: &Path, key: &str) -> PathBuf {
    staging_dir(index_home).join(key)
}

/// Whether a directory-entry name is reserved for orchestrator bookkeeping.
///
/// Reserved names never enter the catalog, on either side.
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with('_') || name.starts_with('.')
}
