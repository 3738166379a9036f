//! Index command implementation.

use std::io::Write;
use std::num::NonZeroUsize;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use wof_spatial_core::{
    ConnectionBudget, IndexOutcome, IndexSummary, Indexer, WorkItem, default_worker_count,
    index_many,
};
use wof_spatial_data::{
    DEFAULT_CSV_COLUMN, FeatureIndexer, GeometryMode, IndexOptions, SourceMode, SourceOptions,
    SqliteSpatialStore, spawn_source,
};

use crate::{
    ARG_DATABASE, ARG_INDEX_WORKERS, ARG_MAX_CONNECTIONS, CliError, DEFAULT_MAX_CONNECTIONS,
    ENV_INDEX_DATABASE, build_runtime, init_logging, non_zero, write_line,
};

/// CLI arguments for the `index` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Index Who's On First GeoJSON features into a SQLite spatial \
                 database. Inputs are interpreted according to --mode: feature \
                 files, directories to walk, file lists, CSV manifests or \
                 SQLite databases holding a geojson table.",
    about = "Index features into a spatial database"
)]
#[ortho_config(prefix = "WOF_SPATIAL")]
pub(crate) struct IndexArgs {
    /// Inputs to index, interpreted according to `--mode`.
    #[arg(value_name = "path")]
    #[serde(default)]
    pub(crate) inputs: Vec<Utf8PathBuf>,
    /// Path to the SQLite spatial database; created when absent.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Maximum number of concurrent store connections.
    #[arg(long = ARG_MAX_CONNECTIONS, value_name = "n")]
    #[serde(default)]
    pub(crate) max_connections: Option<usize>,
    /// Number of inputs indexed concurrently.
    #[arg(long = ARG_INDEX_WORKERS, value_name = "n")]
    #[serde(default)]
    pub(crate) index_workers: Option<usize>,
    /// How polygon geometries are stored (default, bbox or centroid).
    #[arg(long, value_name = "mode")]
    #[serde(default)]
    pub(crate) geometry: Option<GeometryMode>,
    /// How inputs are interpreted (files, directory, filelist, csv or sqlite).
    #[arg(long, value_name = "mode")]
    #[serde(default)]
    pub(crate) mode: Option<SourceMode>,
    /// CSV column holding feature paths.
    #[arg(long, value_name = "name")]
    #[serde(default)]
    pub(crate) csv_column: Option<String>,
    /// Keep alternate-geometry files when walking directories.
    #[arg(long)]
    #[serde(default)]
    pub(crate) allow_alt: bool,
    /// Log every upsert.
    #[arg(long)]
    #[serde(default)]
    pub(crate) verbose: bool,
    /// Process every input without writing. Implies `--verbose`.
    #[arg(long)]
    #[serde(default)]
    pub(crate) dry_run: bool,
}

impl IndexArgs {
    fn into_config(self) -> Result<IndexConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        IndexConfig::try_from(merged)
    }
}

/// Resolved `index` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexConfig {
    /// Inputs, interpreted according to `source.mode`.
    pub(crate) inputs: Vec<Utf8PathBuf>,
    pub(crate) database: Utf8PathBuf,
    pub(crate) max_connections: NonZeroUsize,
    pub(crate) workers: NonZeroUsize,
    pub(crate) options: IndexOptions,
    pub(crate) source: SourceOptions,
}

impl IndexConfig {
    /// The lone input of a single-file invocation.
    ///
    /// Such runs surface the item's error as the command's error instead of
    /// a summary.
    pub(crate) fn single_file(&self) -> Option<&Utf8Path> {
        match (self.source.mode, self.inputs.as_slice()) {
            (SourceMode::Files, [only]) => Some(only.as_path()),
            _ => None,
        }
    }
}

impl TryFrom<IndexArgs> for IndexConfig {
    type Error = CliError;

    fn try_from(args: IndexArgs) -> Result<Self, Self::Error> {
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_INDEX_DATABASE,
        })?;
        if args.inputs.is_empty() {
            return Err(CliError::NoInputs);
        }
        let max_connections =
            non_zero(args.max_connections, ARG_MAX_CONNECTIONS)?.unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let workers =
            non_zero(args.index_workers, ARG_INDEX_WORKERS)?.unwrap_or_else(default_worker_count);
        let options = IndexOptions::default()
            .with_geometry_mode(args.geometry.unwrap_or_default())
            .with_verbose(args.verbose)
            .with_dry_run(args.dry_run);
        let source = SourceOptions {
            mode: args.mode.unwrap_or_default(),
            csv_column: args
                .csv_column
                .unwrap_or_else(|| DEFAULT_CSV_COLUMN.to_owned()),
            allow_alt: args.allow_alt,
        };
        Ok(Self {
            inputs: args.inputs,
            database,
            max_connections,
            workers,
            options,
            source,
        })
    }
}

pub(crate) fn run_index(args: IndexArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    init_logging(config.options.verbose());
    let store = open_store(&config.database)?;
    build_runtime()?.block_on(execute_index(&config, store, writer))
}

/// Open the database and make sure the schema exists.
pub(crate) fn open_store(database: &Utf8Path) -> Result<SqliteSpatialStore, CliError> {
    let store = SqliteSpatialStore::open(database)?;
    store.initialise_schema()?;
    Ok(store)
}

pub(crate) async fn execute_index(
    config: &IndexConfig,
    store: SqliteSpatialStore,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let budget = Arc::new(ConnectionBudget::new(
        Arc::new(store),
        config.max_connections,
    ));
    let indexer = Arc::new(FeatureIndexer::new(budget, config.options));

    if let Some(path) = config.single_file() {
        let outcome = indexer
            .index_one(WorkItem::Path(path.to_path_buf()))
            .await
            .map_err(|source| CliError::Index {
                path: path.to_path_buf(),
                source: Box::new(source),
            })?;
        return write_line(writer, &format!("{path}: {}", describe_outcome(outcome)));
    }

    let capacity = config.workers.get().saturating_mul(4);
    let items = spawn_source(config.inputs.clone(), config.source.clone(), capacity);
    let summary = index_many(items, config.workers, indexer).await;
    info!(
        "indexed {} inputs from {} sources",
        summary.total(),
        config.inputs.len()
    );
    write_summary(writer, &summary)?;
    if summary.failed > 0 {
        return Err(CliError::PartialIndex {
            failed: summary.failed,
            total: summary.total(),
        });
    }
    Ok(())
}

const fn describe_outcome(outcome: IndexOutcome) -> &'static str {
    match outcome {
        IndexOutcome::Indexed => "indexed",
        IndexOutcome::Skipped => "skipped",
        IndexOutcome::DryRun => "dry run",
    }
}

fn write_summary(writer: &mut dyn Write, summary: &IndexSummary) -> Result<(), CliError> {
    write_line(
        writer,
        &format!(
            "succeeded={} skipped={} failed={}",
            summary.succeeded, summary.skipped, summary.failed
        ),
    )?;
    for failure in &summary.failures {
        write_line(
            writer,
            &format!("failed {}: {}", failure.source, failure.message),
        )?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<IndexConfig, CliError> {
    let merged = IndexArgs::merge_from_layers(layers).map_err(CliError::from)?;
    IndexConfig::try_from(merged)
}
