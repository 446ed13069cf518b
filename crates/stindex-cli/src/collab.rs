//! Command-template collaborators.
//!
//! The real slicer and indexer are external batch jobs. This front end
//! invokes them as shell command templates with `{input}` and `{output}`
//! placeholders, for example:
//!
//! ```text
//! stindex run ... \
//!     --slice-cmd 'sthadoop slice {input} {output}' \
//!     --index-cmd 'sthadoop index {input} {output}'
//! ```
//!
//! Run-scoped options ride along as environment variables:
//! `STINDEX_OVERWRITE=1` when overwriting, and `STINDEX_OPT_<KEY>` for each
//! `-D key=value`. Templates run through `sh -c`, so this front end is
//! Unix-only; the core library has no such restriction.
//!
//! The orchestrator hands the indexer a staging path as `{output}` and
//! publishes it atomically itself, so the index command does not need any
//! atomicity discipline of its own.

use std::path::Path;

use async_trait::async_trait;
use stindex_core::{Indexer, JobConfig, JobError, Slicer};
use tokio::process::Command;

/// Placeholder replaced with the input path in command templates.
const INPUT_PLACEHOLDER: &str = "{input}";
/// Placeholder replaced with the output path in command templates.
const OUTPUT_PLACEHOLDER: &str = "{output}";

async fn run_template(template: &str, input: &Path, output: &Path, job: &JobConfig) -> Result<(), JobError> {
    let rendered = template
        .replace(INPUT_PLACEHOLDER, &input.display().to_string())
        .replace(OUTPUT_PLACEHOLDER, &output.display().to_string());

    let mut command = Command::new("sh");
    command.arg("-c").arg(&rendered);
    if job.overwrite {
        command.env("STINDEX_OVERWRITE", "1");
    }
    for (key, value) in &job.options {
        command.env(format!("STINDEX_OPT_{}", key.to_uppercase()), value);
    }

    let output = command.output().await.map_err(|e| JobError::Failed {
        message: format!("cannot spawn `{rendered}`: {e}"),
    })?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let tail: String = stderr
        .lines()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join(" | ");
    Err(JobError::Failed {
        message: format!("`{rendered}` exited with {}: {tail}", output.status),
    })
}

/// Slicer spawning a configured command template, if one was given.
pub struct CommandSlicer {
    template: Option<String>,
}

impl CommandSlicer {
    pub fn new(template: Option<String>) -> CommandSlicer {
        CommandSlicer { template }
    }
}

#[async_trait]
impl Slicer for CommandSlicer {
    async fn slice(
        &self,
        dataset: &Path,
        slice_root: &Path,
        job: &JobConfig,
    ) -> Result<(), JobError> {
        let Some(template) = &self.template else {
            return Err(JobError::Failed {
                message: "slice home is missing and no --slice-cmd was given".to_string(),
            });
        };
        run_template(template, dataset, slice_root, job).await
    }
}

/// Indexer spawning a configured command template per partition.
pub struct CommandIndexer {
    template: String,
}

impl CommandIndexer {
    pub fn new(template: String) -> CommandIndexer {
        CommandIndexer { template }
    }
}

#[async_trait]
impl Indexer for CommandIndexer {
    async fn build_index(
        &self,
        slice_path: &Path,
        index_path: &Path,
        job: &JobConfig,
    ) -> Result<(), JobError> {
        run_template(&self.template, slice_path, index_path, job).await
    }
}
