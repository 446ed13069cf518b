//! Reconciliation core for incremental spatio-temporal index maintenance.
//!
//! An external slicing job partitions a raw dataset into time buckets (one
//! directory per bucket under a *slice home*); an external indexing job
//! builds one spatial index per partition (one directory per index under an
//! *index home*). This crate owns everything in between:
//!
//! - Timestamp-to-bucket-key mapping for the supported granularities
//!   (`granularity` module).
//! - The on-disk layout conventions tying the two directory trees together
//!   (`layout` module).
//! - Directory discovery and build-set computation as an explicit set
//!   difference (`catalog` module).
//! - Per-partition build dispatch with bounded concurrency and failure
//!   isolation (`scheduler` module).
//! - The collaborator seam for the external slicer and indexer, including
//!   the staged atomic-publish discipline (`collab` module).
//! - The orchestration driver wiring the above into one idempotent run
//!   (`orchestrator` module).
//!
//! The directory trees are the only durable record: nothing is persisted by
//! this crate, and a re-run re-derives the full catalog from the
//! filesystem. Heavy work (slicing, spatial indexing) stays behind the
//! collaborator traits.
#![deny(missing_docs)]
pub mod catalog;
pub mod collab;
pub mod granularity;
pub mod layout;
pub mod orchestrator;
pub mod scheduler;
pub mod storage;

pub use catalog::{Catalog, DiscoveryError, PartitionState};
pub use collab::{Indexer, JobConfig, JobError, Slicer, StagedIndexer};
pub use granularity::{Granularity, ParseGranularityError};
pub use orchestrator::{
    Orchestrator, OrchestratorError, ParseShapeError, RunConfig, RunSummary, Shape,
};
pub use scheduler::{BuildFailure, BuildReport, BuildScheduler};
pub use storage::StorageError;
