//! Build dispatch over the build set, with failure isolation.
//!
//! Every member of the build set is an independent, disjoint-output task:
//! it reads its own slice directory and writes only its own index
//! directory. That independence is what makes the set safe to dispatch
//! with a bounded worker pool. Three rules keep it safe:
//!
//! - membership is fixed before any worker starts (no re-querying the
//!   catalog mid-run),
//! - no key is ever dispatched twice within a run,
//! - one worker's failure never cancels or blocks its siblings.
//!
//! A failed build is recorded with its key and cause and otherwise
//! ignored: the partition stays unindexed on disk, so the next run's
//! discovery naturally puts it back into the build set. No retry
//! bookkeeping exists anywhere.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{info, warn};

use crate::collab::{Indexer, JobConfig, JobError};
use crate::layout;

/// One partition whose build failed, with its cause.
#[derive(Debug)]
pub struct BuildFailure {
    /// The partition key that failed to build.
    pub key: String,
    /// Why the build failed.
    pub cause: JobError,
}

/// Outcome of dispatching one build set.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Number of builds dispatched.
    pub attempted: usize,
    /// Keys whose index was built and published, lexicographic.
    pub succeeded: Vec<String>,
    /// Keys whose build failed, with causes, lexicographic by key.
    pub failed: Vec<BuildFailure>,
}

impl BuildReport {
    /// Whether every attempted build succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Dispatches index builds for a build set.
pub struct BuildScheduler {
    max_concurrency: usize,
}

impl BuildScheduler {
    /// Create a scheduler with at most `max_concurrency` builds in flight.
    ///
    /// Zero is clamped to 1, so a misconfigured caller runs sequentially
    /// rather than deadlocking on an empty permit pool. Callers wanting a
    /// hard error on zero validate before constructing.
    pub fn new(max_concurrency: usize) -> BuildScheduler {
        BuildScheduler {
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Dispatch one build per key in `build_set` and collect the report.
    ///
    /// Each dispatch is a blocking call from the scheduler's point of
    /// view: a key counts as built only once the indexer has returned
    /// success. Completion order is unconstrained; the report is sorted so
    /// the outcome reads the same regardless of interleaving.
    pub async fn run(
        &self,
        build_set: Vec<String>,
        slice_home: &Path,
        index_home: &Path,
        indexer: Arc<dyn Indexer>,
        job: &JobConfig,
    ) -> BuildReport {
        let mut report = BuildReport {
            attempted: build_set.len(),
            ..BuildReport::default()
        };
        if build_set.is_empty() {
            info!("build set is empty; nothing to dispatch");
            return report;
        }

        let slice_home: Arc<PathBuf> = Arc::new(slice_home.to_path_buf());
        let index_home: Arc<PathBuf> = Arc::new(index_home.to_path_buf());
        let job = Arc::new(job.clone());
        let permits = Arc::new(Semaphore::new(self.max_concurrency));

        let mut tasks: JoinSet<(String, Result<(), JobError>)> = JoinSet::new();
        let mut keys_by_task: HashMap<Id, String> = HashMap::new();

        for key in build_set {
            let slice_home = Arc::clone(&slice_home);
            let index_home = Arc::clone(&index_home);
            let indexer = Arc::clone(&indexer);
            let job = Arc::clone(&job);
            let permits = Arc::clone(&permits);

            let task_key = key.clone();
            let handle = tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        // The semaphore is never closed; this is unreachable
                        // short of a scheduler bug.
                        return (
                            task_key,
                            Err(JobError::Failed {
                                message: "build permit pool closed".to_string(),
                            }),
                        );
                    }
                };

                let slice_path = layout::slice_partition(&slice_home, &task_key);
                let index_path = layout::index_partition(&index_home, &task_key);
                info!(key = %task_key, "dispatching index build");
                let result = indexer.build_index(&slice_path, &index_path, &job).await;
                (task_key, result)
            });
            keys_by_task.insert(handle.id(), key);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, (key, Ok(())))) => {
                    keys_by_task.remove(&id);
                    info!(key = %key, "index build succeeded");
                    report.succeeded.push(key);
                }
                Ok((id, (key, Err(cause)))) => {
                    keys_by_task.remove(&id);
                    warn!(key = %key, error = %cause, "index build failed; partition stays unindexed");
                    report.failed.push(BuildFailure { key, cause });
                }
                Err(join_err) => {
                    // A panicked build task is a failure of that key only.
                    let key = keys_by_task
                        .remove(&join_err.id())
                        .unwrap_or_else(|| "<unknown>".to_string());
                    warn!(key = %key, error = %join_err, "index build task aborted");
                    report.failed.push(BuildFailure {
                        key,
                        cause: JobError::Failed {
                            message: format!("build task aborted: {join_err}"),
                        },
                    });
                }
            }
        }

        report.succeeded.sort();
        report.failed.sort_by(|a, b| a.key.cmp(&b.key));
        report
    }
}
