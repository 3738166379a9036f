//! Command-line interface for indexing and querying Who's On First records.
#![forbid(unsafe_code)]

use std::io::Write;
use std::num::NonZeroUsize;

use camino::Utf8Path;
use clap::{Parser, Subcommand};

mod error;
mod index;
mod intersects;

pub use error::CliError;

use index::IndexArgs;
use intersects::IntersectsArgs;

const ARG_DATABASE: &str = "database";
const ARG_MAX_CONNECTIONS: &str = "max-connections";
const ARG_INDEX_WORKERS: &str = "index-workers";
const ARG_FETCH_WORKERS: &str = "fetch-workers";
const ARG_PAGE_SIZE: &str = "page-size";
const ARG_PLACETYPE: &str = "placetype";
const ARG_QUERY_FEATURE: &str = "feature";
const ENV_INDEX_DATABASE: &str = "WOF_SPATIAL_CMDS_INDEX_DATABASE";
const ENV_INTERSECTS_DATABASE: &str = "WOF_SPATIAL_CMDS_INTERSECTS_DATABASE";
const ENV_INTERSECTS_PLACETYPE: &str = "WOF_SPATIAL_CMDS_INTERSECTS_PLACETYPE";
const ENV_INTERSECTS_FEATURE: &str = "WOF_SPATIAL_CMDS_INTERSECTS_FEATURE";

/// Connection budget used when `--max-connections` is not set.
const DEFAULT_MAX_CONNECTIONS: NonZeroUsize = match NonZeroUsize::new(10) {
    Some(value) => value,
    None => NonZeroUsize::MIN,
};

/// Run the CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = std::io::stdout().lock();
    match cli.command {
        Command::Index(args) => index::run_index(args, &mut stdout),
        Command::Intersects(args) => intersects::run_intersects(args, &mut stdout),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "wof-spatial",
    about = "Index Who's On First features and run point-in-polygon style queries",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index GeoJSON features into a spatial database.
    Index(IndexArgs),
    /// List stored records intersecting a feature's geometry.
    Intersects(IntersectsArgs),
}

/// Install the process logger. Verbose runs log at `debug`, others at `warn`
/// unless `RUST_LOG` says otherwise.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let env = env_logger::Env::default().default_filter_or(level);
    if env_logger::Builder::from_env(env).try_init().is_err() {
        log::debug!("a logger is already installed");
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
}

fn non_zero(value: Option<usize>, field: &'static str) -> Result<Option<NonZeroUsize>, CliError> {
    value
        .map(|raw| NonZeroUsize::new(raw).ok_or(CliError::ZeroArgument { field }))
        .transpose()
}

fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    match wof_spatial_fs::file_is_file(path) {
        Ok(true) => Ok(()),
        Ok(false) => Err(CliError::MissingSourceFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            Err(CliError::MissingSourceFile {
                field,
                path: path.to_path_buf(),
            })
        }
        Err(source) => Err(CliError::InspectSourcePath {
            field,
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_line(writer: &mut dyn Write, line: &str) -> Result<(), CliError> {
    writer
        .write_all(line.as_bytes())
        .and_then(|()| writer.write_all(b"\n"))
        .map_err(CliError::WriteOutput)
}

#[cfg(test)]
mod tests;
