//! The collaborator seam: external slicer and indexer contracts.
//!
//! Slicing and spatial indexing are heavy, independently-scheduled jobs.
//! The orchestrator only needs a blocking-return contract at this
//! boundary: a call comes back `Ok` once the work is fully done, or `Err`
//! with a cause. How a collaborator runs the work (in process, as a
//! spawned command, as a submitted cluster job) is its own concern.
//!
//! [`StagedIndexer`] wraps any [`Indexer`] with the atomic-publish
//! discipline: the inner indexer writes into a staging directory, and only
//! a fully successful build is renamed to the canonical index path. An
//! aborted or failed build therefore never leaves a directory that looks
//! complete to the next discovery pass.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use snafu::prelude::*;

use crate::layout;
use crate::storage::{self, StorageError};

/// Run-scoped options forwarded to collaborator invocations.
///
/// Owned by a single orchestration run and passed explicitly; nothing here
/// is process-global, so several runs (for example, one per granularity)
/// can coexist in one process.
#[derive(Debug, Clone, Default)]
pub struct JobConfig {
    /// Force re-indexing of partitions that already have an index, and
    /// tell collaborators to replace rather than skip existing output.
    pub overwrite: bool,
    /// Free-form pass-through options for collaborators.
    pub options: BTreeMap<String, String>,
}

/// Failure cause reported by one collaborator invocation.
#[derive(Debug, Snafu)]
pub enum JobError {
    /// The collaborator ran and reported failure.
    #[snafu(display("collaborator failed: {message}"))]
    Failed {
        /// Collaborator-provided failure description.
        message: String,
    },

    /// I/O failure while invoking the collaborator.
    #[snafu(display("I/O error at {path}: {source}"))]
    Io {
        /// The path involved in the failure.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Storage failure while staging or publishing the output.
    #[snafu(display("{source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },
}

/// External process that partitions a raw dataset by time.
///
/// Invoked at most once per run, and only when the slice home does not
/// exist yet; the call is expected to be idempotent regardless. It is
/// handed the slice *root* (`<dataset_parent>/slice`) and creates the
/// granularity directory with one subdirectory per partition key beneath
/// it.
#[async_trait]
pub trait Slicer: Send + Sync {
    /// Slice `dataset` into time partitions under `slice_root`.
    async fn slice(&self, dataset: &Path, slice_root: &Path, job: &JobConfig)
        -> Result<(), JobError>;
}

/// External process that builds one spatial index from one partition.
///
/// Must leave a complete output tree at `index_path` on success and
/// nothing discoverable there on failure. Implementations handed to
/// [`crate::orchestrator::Orchestrator`] get that second half for free:
/// the orchestrator wraps them in [`StagedIndexer`], so `index_path` is a
/// staging location and publishing is the wrapper's job.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Build the spatial index for the partition at `slice_path`,
    /// writing the result to `index_path`.
    async fn build_index(
        &self,
        slice_path: &Path,
        index_path: &Path,
        job: &JobConfig,
    ) -> Result<(), JobError>;
}

/// Atomic-publish wrapper around an [`Indexer`].
///
/// Builds into `<index_home>/_staging/<key>` and renames to
/// `<index_home>/<key>` only on success. The staging directory sits under
/// a reserved name, so a crash mid-build leaves nothing that discovery
/// would mistake for a finished index; leftovers are cleared the next time
/// the same key is built.
pub struct StagedIndexer {
    inner: Arc<dyn Indexer>,
}

impl StagedIndexer {
    /// Wrap an indexer with staged publishing.
    pub fn new(inner: Arc<dyn Indexer>) -> StagedIndexer {
        StagedIndexer { inner }
    }
}

#[async_trait]
impl Indexer for StagedIndexer {
    async fn build_index(
        &self,
        slice_path: &Path,
        index_path: &Path,
        job: &JobConfig,
    ) -> Result<(), JobError> {
        let index_home = index_path.parent().context(FailedSnafu {
            message: format!("index path {} has no parent", index_path.display()),
        })?;
        let key = index_path
            .file_name()
            .and_then(|name| name.to_str())
            .context(FailedSnafu {
                message: format!("index path {} has no valid key name", index_path.display()),
            })?;

        let staging = layout::staging_partition(index_home, key);
        storage::ensure_dir(&layout::staging_dir(index_home))
            .await
            .context(StorageSnafu)?;

        // A previous run may have died mid-build; its leftovers are stale.
        if storage::dir_exists(&staging).await.context(StorageSnafu)? {
            storage::remove_dir_tree(&staging)
                .await
                .context(StorageSnafu)?;
        }

        if let Err(cause) = self.inner.build_index(slice_path, &staging, job).await {
            storage::remove_dir_tree_best_effort(&staging).await;
            return Err(cause);
        }

        if storage::dir_exists(index_path).await.context(StorageSnafu)? {
            if job.overwrite {
                storage::remove_dir_tree(index_path)
                    .await
                    .context(StorageSnafu)?;
            } else {
                // Someone else published this key since discovery. The
                // index exists, which is all reconciliation cares about.
                storage::remove_dir_tree_best_effort(&staging).await;
                return Ok(());
            }
        }

        storage::publish_dir(&staging, index_path)
            .await
            .context(StorageSnafu)
    }
}
