use snafu::Snafu;
use stindex_core::{
    DiscoveryError, OrchestratorError, ParseGranularityError, ParseShapeError, StorageError,
};

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Invalid --granularity '{spec}': {source}"))]
    InvalidGranularity {
        spec: String,
        source: ParseGranularityError,
    },

    #[snafu(display("Invalid --shape '{spec}': {source}"))]
    InvalidShape {
        spec: String,
        source: ParseShapeError,
    },

    #[snafu(display("Invalid -D option '{raw}': expected key=value"))]
    InvalidOption { raw: String },

    #[snafu(display("{source}"))]
    Orchestration { source: OrchestratorError },

    #[snafu(display("{source}"))]
    Discovery { source: DiscoveryError },

    #[snafu(display("Cannot read {path}: {source}"))]
    HomeUnreadable { path: String, source: StorageError },
}
