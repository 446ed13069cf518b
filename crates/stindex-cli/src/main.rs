//! CLI for incremental spatio-temporal index maintenance.

mod collab;
mod error;
mod summary;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use snafu::ResultExt;
use stindex_core::{Catalog, Granularity, Orchestrator, RunConfig, Shape, layout, storage};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::collab::{CommandIndexer, CommandSlicer};
use crate::error::{
    CliResult, DiscoverySnafu, HomeUnreadableSnafu, InvalidGranularitySnafu, InvalidOptionSnafu,
    InvalidShapeSnafu, OrchestrationSnafu,
};

#[derive(Debug, Args)]
struct CatalogArgs {
    /// Path to the raw input dataset
    #[arg(long)]
    dataset: PathBuf,

    /// Root directory for index output, one home per granularity
    #[arg(long)]
    indexes: PathBuf,

    /// Time granularity: hour, day, week, month or year
    #[arg(long)]
    granularity: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile the slice and index trees and build the missing indexes
    Run {
        #[command(flatten)]
        catalog: CatalogArgs,

        /// Record shape; must be a spatio-temporal point type
        #[arg(long, default_value = "st-point")]
        shape: String,

        /// Rebuild every sliced partition, replacing existing indexes
        #[arg(long, default_value_t = false)]
        overwrite: bool,

        /// Maximum index builds in flight at once
        #[arg(long, default_value_t = 1)]
        jobs: usize,

        /// Command template invoking the slicer ({input}, {output})
        #[arg(long = "slice-cmd")]
        slice_cmd: Option<String>,

        /// Command template invoking the indexer ({input}, {output})
        #[arg(long = "index-cmd")]
        index_cmd: String,

        /// Collaborator option, repeatable (e.g. -D sindex=rtree)
        #[arg(short = 'D', value_name = "KEY=VALUE")]
        options: Vec<String>,

        /// Emit the run summary as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Discover the catalog and print what a run would build, dispatching nothing
    Plan {
        #[command(flatten)]
        catalog: CatalogArgs,

        /// Emit the plan as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(Debug, Parser)]
#[command(name = "stindex", about = "Incremental spatio-temporal index maintenance")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

fn parse_granularity(spec: &str) -> CliResult<Granularity> {
    spec.parse::<Granularity>().context(InvalidGranularitySnafu {
        spec: spec.to_string(),
    })
}

fn parse_shape(spec: &str) -> CliResult<Shape> {
    spec.parse::<Shape>().context(InvalidShapeSnafu {
        spec: spec.to_string(),
    })
}

fn parse_options(raw: &[String]) -> CliResult<BTreeMap<String, String>> {
    let mut options = BTreeMap::new();
    for item in raw {
        let Some((key, value)) = item.split_once('=') else {
            return InvalidOptionSnafu { raw: item.clone() }.fail();
        };
        options.insert(key.to_string(), value.to_string());
    }
    Ok(options)
}

#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    catalog: CatalogArgs,
    shape: String,
    overwrite: bool,
    jobs: usize,
    slice_cmd: Option<String>,
    index_cmd: String,
    options: Vec<String>,
    json: bool,
) -> CliResult<ExitCode> {
    let mut cfg = RunConfig::new(
        catalog.dataset,
        catalog.indexes,
        parse_granularity(&catalog.granularity)?,
    );
    cfg.shape = parse_shape(&shape)?;
    cfg.overwrite = overwrite;
    cfg.max_concurrent_builds = jobs;
    cfg.options = parse_options(&options)?;

    let orchestrator = Orchestrator::new(
        Arc::new(CommandSlicer::new(slice_cmd)),
        Arc::new(CommandIndexer::new(index_cmd)),
    );
    info!(
        dataset = %cfg.dataset.display(),
        granularity = %cfg.granularity,
        "starting reconciliation run"
    );
    let run_summary = orchestrator.run(&cfg).await.context(OrchestrationSnafu)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary::run_summary_json(&run_summary))
                .unwrap_or_default()
        );
    } else {
        summary::print_run_summary(&run_summary);
    }

    // Per-partition failures are recoverable (the next run retries them),
    // but operators still want a nonzero exit to notice.
    if run_summary.report.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

async fn cmd_plan(catalog_args: CatalogArgs, json: bool) -> CliResult<ExitCode> {
    let granularity = parse_granularity(&catalog_args.granularity)?;
    let slice_home = layout::slice_home(&catalog_args.dataset, granularity);
    let index_home = layout::index_home(&catalog_args.indexes, granularity);

    // Before the first run the index home may not exist; plan treats it
    // as an empty index set rather than failing.
    let index_home_present = storage::dir_exists(&index_home)
        .await
        .context(HomeUnreadableSnafu {
            path: index_home.display().to_string(),
        })?;
    let catalog = if index_home_present {
        Catalog::discover(&slice_home, &index_home)
            .await
            .context(DiscoverySnafu)?
    } else {
        let sliced = storage::list_dir_names(&slice_home).await.context(
            HomeUnreadableSnafu {
                path: slice_home.display().to_string(),
            },
        )?;
        Catalog::from_sets(sliced, BTreeSet::new())
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary::plan_json(&catalog)).unwrap_or_default()
        );
    } else {
        summary::print_plan(&catalog);
    }
    Ok(ExitCode::SUCCESS)
}

async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Run {
            catalog,
            shape,
            overwrite,
            jobs,
            slice_cmd,
            index_cmd,
            options,
            json,
        } => cmd_run(catalog, shape, overwrite, jobs, slice_cmd, index_cmd, options, json).await,

        Command::Plan { catalog, json } => cmd_plan(catalog, json).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(2)
        }
    }
}
