//! The orchestration driver: one idempotent reconciliation run.
//!
//! A run re-derives everything from the filesystem, so it is safe to
//! re-execute after a crash:
//!
//! 1. Reject bad configuration (wrong record shape, zero concurrency)
//!    before touching any directory.
//! 2. If the slice home is missing, invoke the slicer once; a slicing
//!    failure is fatal because nothing can be discovered without slices.
//! 3. Ensure the index home exists, discover the catalog, compute the
//!    build set, and dispatch builds with per-partition isolation.
//!
//! Fatal errors ([`OrchestratorError`]) abort the run with no partial
//! catalog or builds. Per-partition failures never cross the scheduler
//! boundary; they come back aggregated in the [`RunSummary`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use snafu::prelude::*;
use tracing::{debug, info};

use crate::catalog::{Catalog, DiscoveryError};
use crate::collab::{Indexer, JobConfig, JobError, Slicer, StagedIndexer};
use crate::granularity::Granularity;
use crate::layout;
use crate::scheduler::{BuildReport, BuildScheduler};
use crate::storage::{self, StorageError};

/// Record/shape type of the dataset.
///
/// Only the spatio-temporal point shape carries the timestamp the slicer
/// buckets on, so every other shape is rejected before discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// A spatio-temporal point (location plus timestamp).
    StPoint,
    /// A plain spatial point, no time component.
    Point,
    /// A spatial rectangle, no time component.
    Rectangle,
}

impl Shape {
    /// Whether this shape carries a time component usable for slicing.
    pub fn is_spatiotemporal(&self) -> bool {
        matches!(self, Shape::StPoint)
    }

    /// Canonical name used in configuration and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::StPoint => "st-point",
            Shape::Point => "point",
            Shape::Rectangle => "rectangle",
        }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognized shape name.
#[derive(Debug, Snafu)]
#[snafu(display(
    "unrecognized shape '{value}' (expected one of: st-point, point, rectangle)"
))]
pub struct ParseShapeError {
    /// The value that failed to parse.
    pub value: String,
}

impl FromStr for Shape {
    type Err = ParseShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "st-point" | "stpoint" => Ok(Shape::StPoint),
            "point" => Ok(Shape::Point),
            "rect" | "rectangle" => Ok(Shape::Rectangle),
            other => Err(ParseShapeError {
                value: other.to_string(),
            }),
        }
    }
}

/// Configuration for one orchestration run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Path to the raw input dataset.
    pub dataset: PathBuf,
    /// Root directory holding index homes, one per granularity.
    pub indexes_root: PathBuf,
    /// Time granularity for partition keys.
    pub granularity: Granularity,
    /// Record shape; must be spatio-temporal.
    pub shape: Shape,
    /// Force re-indexing of every sliced partition.
    pub overwrite: bool,
    /// Maximum index builds in flight at once; must be nonzero.
    pub max_concurrent_builds: usize,
    /// Free-form options forwarded to collaborators.
    pub options: BTreeMap<String, String>,
}

impl RunConfig {
    /// A run configuration with defaults: spatio-temporal point shape, no
    /// overwrite, sequential builds, no collaborator options.
    pub fn new(
        dataset: impl Into<PathBuf>,
        indexes_root: impl Into<PathBuf>,
        granularity: Granularity,
    ) -> RunConfig {
        RunConfig {
            dataset: dataset.into(),
            indexes_root: indexes_root.into(),
            granularity,
            shape: Shape::StPoint,
            overwrite: false,
            max_concurrent_builds: 1,
            options: BTreeMap::new(),
        }
    }
}

/// User-visible outcome of one orchestration run.
#[derive(Debug)]
pub struct RunSummary {
    /// Sliced partitions discovered.
    pub discovered: usize,
    /// Sliced partitions that already had an index before this run.
    pub already_indexed: usize,
    /// Indexes with no corresponding slice; reported, never touched.
    pub stale_indexes: Vec<String>,
    /// Dispatch outcome for the build set.
    pub report: BuildReport,
}

/// Fatal errors aborting an orchestration run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum OrchestratorError {
    /// The configured shape has no time component.
    #[snafu(display("shape '{shape}' is not a spatio-temporal point type"))]
    InvalidShape {
        /// The rejected shape.
        shape: Shape,
    },

    /// `max_concurrent_builds` was zero.
    #[snafu(display("max_concurrent_builds must be nonzero"))]
    InvalidConcurrency,

    /// The slicing collaborator failed when the slice home was missing.
    #[snafu(display("slicing failed for dataset {dataset}: {source}"))]
    SliceDispatch {
        /// The dataset that could not be sliced.
        dataset: String,
        /// The slicer's failure cause.
        source: JobError,
    },

    /// The index home could not be created.
    #[snafu(display("cannot initialize index home {path}: {source}"))]
    IndexHomeInit {
        /// The index home path.
        path: String,
        /// Underlying storage error.
        source: StorageError,
    },

    /// Catalog discovery failed; the build set cannot be trusted.
    #[snafu(display("discovery failed: {source}"))]
    Discovery {
        /// Underlying discovery error.
        source: DiscoveryError,
    },
}

/// Wires the catalog and scheduler to a pair of collaborators.
pub struct Orchestrator {
    slicer: Arc<dyn Slicer>,
    indexer: Arc<dyn Indexer>,
}

impl Orchestrator {
    /// Create an orchestrator over the given collaborators.
    ///
    /// The indexer is wrapped in [`StagedIndexer`] here, so the
    /// atomic-publish discipline holds for every implementation handed in.
    pub fn new(slicer: Arc<dyn Slicer>, indexer: Arc<dyn Indexer>) -> Orchestrator {
        Orchestrator {
            slicer,
            indexer: Arc::new(StagedIndexer::new(indexer)),
        }
    }

    /// Execute one reconciliation run.
    pub async fn run(&self, cfg: &RunConfig) -> Result<RunSummary, OrchestratorError> {
        ensure!(
            cfg.shape.is_spatiotemporal(),
            InvalidShapeSnafu { shape: cfg.shape }
        );
        ensure!(cfg.max_concurrent_builds > 0, InvalidConcurrencySnafu);

        let slice_home = layout::slice_home(&cfg.dataset, cfg.granularity);
        let index_home = layout::index_home(&cfg.indexes_root, cfg.granularity);
        let job = JobConfig {
            overwrite: cfg.overwrite,
            options: cfg.options.clone(),
        };

        self.ensure_sliced(cfg, &slice_home, &job).await?;

        storage::ensure_dir(&index_home)
            .await
            .context(IndexHomeInitSnafu {
                path: index_home.display().to_string(),
            })?;

        let catalog = Catalog::discover(&slice_home, &index_home)
            .await
            .context(DiscoverySnafu)?;

        // Overwrite ignores index presence: every sliced partition gets
        // rebuilt, and the flag rides along to the collaborator so its
        // staged output replaces the published one.
        let build_set = if cfg.overwrite {
            catalog.sliced().iter().cloned().collect()
        } else {
            catalog.build_set()
        };
        info!(
            granularity = %cfg.granularity,
            discovered = catalog.discovered(),
            already_indexed = catalog.already_indexed(),
            to_build = build_set.len(),
            "catalog computed"
        );

        let scheduler = BuildScheduler::new(cfg.max_concurrent_builds);
        let report = scheduler
            .run(build_set, &slice_home, &index_home, Arc::clone(&self.indexer), &job)
            .await;

        Ok(RunSummary {
            discovered: catalog.discovered(),
            already_indexed: catalog.already_indexed(),
            stale_indexes: catalog.stale_indexes(),
            report,
        })
    }

    /// Invoke the slicer once if the slice home does not exist yet.
    async fn ensure_sliced(
        &self,
        cfg: &RunConfig,
        slice_home: &Path,
        job: &JobConfig,
    ) -> Result<(), OrchestratorError> {
        let present = storage::dir_exists(slice_home)
            .await
            .context(crate::catalog::SliceHomeSnafu {
                path: slice_home.display().to_string(),
            })
            .context(DiscoverySnafu)?;

        if present {
            debug!(slice_home = %slice_home.display(), "slice home present; slicing skipped");
            return Ok(());
        }

        let slice_root = layout::slice_root(&cfg.dataset);
        info!(
            dataset = %cfg.dataset.display(),
            slice_root = %slice_root.display(),
            "slice home missing; invoking slicer"
        );
        self.slicer
            .slice(&cfg.dataset, &slice_root, job)
            .await
            .context(SliceDispatchSnafu {
                dataset: cfg.dataset.display().to_string(),
            })
    }
}
