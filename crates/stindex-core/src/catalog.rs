//! Partition discovery and build-set computation.
//!
//! A [`Catalog`] is an ephemeral snapshot of two directory listings: which
//! partitions the slicer has produced, and which already have a built
//! index. It is recomputed from scratch on every orchestration run; the
//! directory trees themselves are the durable record, so there is nothing
//! to invalidate and nothing to persist.
//!
//! Discovery is deliberately decoupled from mutation: building a catalog
//! never writes to either home, and both listings complete in full before
//! the build set is read. The build set is a plain set difference over two
//! immutable sets, so it is trivially testable without any filesystem.

use std::collections::BTreeSet;
use std::path::Path;

use snafu::prelude::*;

use crate::storage::{self, StorageError};

/// Where one partition key sits in its lifecycle.
///
/// `Unsliced` has no representation: a key the slicer has not produced is
/// simply absent from the catalog. There is likewise no failed state; a
/// partition whose build failed stays `SlicedUnindexed` and re-enters the
/// build set on the next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    /// Sliced but not yet indexed; a member of the build set.
    SlicedUnindexed,
    /// Index present; terminal.
    Indexed,
}

/// Fatal discovery failures.
///
/// The catalog cannot be trusted if either home is unreadable, so there is
/// no partial discovery: the first listing failure aborts the run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DiscoveryError {
    /// The index home could not be listed.
    #[snafu(display("cannot list index home {path}: {source}"))]
    IndexHome {
        /// The index home path.
        path: String,
        /// Underlying storage error.
        source: StorageError,
    },

    /// The slice home could not be listed.
    #[snafu(display("cannot list slice home {path}: {source}"))]
    SliceHome {
        /// The slice home path.
        path: String,
        /// Underlying storage error.
        source: StorageError,
    },
}

/// Snapshot of sliced and indexed partitions for one orchestration run.
#[derive(Debug, Clone)]
pub struct Catalog {
    sliced: BTreeSet<String>,
    indexed: BTreeSet<String>,
}

impl Catalog {
    /// Discover the catalog from the two home directories.
    ///
    /// Lists the index home first, then the slice home; only directory
    /// entries count (see [`storage::list_dir_names`] for the listing
    /// discipline). Either listing failing is fatal.
    pub async fn discover(slice_home: &Path, index_home: &Path) -> Result<Catalog, DiscoveryError> {
        let indexed = storage::list_dir_names(index_home)
            .await
            .context(IndexHomeSnafu {
                path: index_home.display().to_string(),
            })?;
        let sliced = storage::list_dir_names(slice_home)
            .await
            .context(SliceHomeSnafu {
                path: slice_home.display().to_string(),
            })?;
        Ok(Catalog::from_sets(sliced, indexed))
    }

    /// Build a catalog from explicit sets, without touching a filesystem.
    pub fn from_sets(sliced: BTreeSet<String>, indexed: BTreeSet<String>) -> Catalog {
        Catalog { sliced, indexed }
    }

    /// Partitions the slicer has produced.
    pub fn sliced(&self) -> &BTreeSet<String> {
        &self.sliced
    }

    /// Partitions that already have an index directory.
    pub fn indexed(&self) -> &BTreeSet<String> {
        &self.indexed
    }

    /// The state of one partition key, or `None` if it is unsliced and
    /// unindexed.
    pub fn state(&self, key: &str) -> Option<PartitionState> {
        if self.indexed.contains(key) {
            Some(PartitionState::Indexed)
        } else if self.sliced.contains(key) {
            Some(PartitionState::SlicedUnindexed)
        } else {
            None
        }
    }

    /// Partitions requiring a build: sliced minus indexed, lexicographic.
    ///
    /// The ordering makes dispatch (and therefore test runs) reproducible.
    pub fn build_set(&self) -> Vec<String> {
        self.sliced.difference(&self.indexed).cloned().collect()
    }

    /// Number of sliced partitions discovered.
    pub fn discovered(&self) -> usize {
        self.sliced.len()
    }

    /// Number of sliced partitions that already have an index.
    pub fn already_indexed(&self) -> usize {
        self.sliced.intersection(&self.indexed).count()
    }

    /// Indexes with no corresponding slice, lexicographic.
    ///
    /// These can appear after source-data deletion. They are reported but
    /// never touched; whether to garbage-collect them is a separate policy
    /// decision outside this subsystem.
    pub fn stale_indexes(&self) -> Vec<String> {
        self.indexed.difference(&self.sliced).cloned().collect()
    }
}
