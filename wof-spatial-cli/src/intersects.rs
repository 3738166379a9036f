//! Intersects command implementation.

use std::io::Write;
use std::num::{NonZeroU64, NonZeroUsize};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use wof_spatial_core::{
    ConnectionBudget, DEFAULT_FETCH_WORKERS, DEFAULT_PAGE_SIZE, Feature, IntersectsQuery,
    Placetype, StoredRecord, intersects,
};
use wof_spatial_data::{GeoJsonFeature, SqliteSpatialStore};

use crate::{
    ARG_DATABASE, ARG_FETCH_WORKERS, ARG_MAX_CONNECTIONS, ARG_PAGE_SIZE, ARG_PLACETYPE,
    ARG_QUERY_FEATURE, CliError, DEFAULT_MAX_CONNECTIONS, ENV_INTERSECTS_DATABASE,
    ENV_INTERSECTS_FEATURE, ENV_INTERSECTS_PLACETYPE, build_runtime, init_logging, non_zero,
    require_existing, write_line,
};

/// CLI arguments for the `intersects` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Print, one JSON object per line, every stored record of the \
                 given placetype whose geometry (or centroid, for records \
                 without one) intersects the geometry of a GeoJSON feature.",
    about = "Find stored records intersecting a feature"
)]
#[ortho_config(prefix = "WOF_SPATIAL")]
pub(crate) struct IntersectsArgs {
    /// GeoJSON feature whose geometry is the query shape.
    #[arg(value_name = "path")]
    #[serde(default)]
    pub(crate) feature: Option<Utf8PathBuf>,
    /// Path to the SQLite spatial database.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Placetype of the records to return, for example `locality`.
    #[arg(long = ARG_PLACETYPE, value_name = "name")]
    #[serde(default)]
    pub(crate) placetype: Option<String>,
    /// Match superseded records instead of current ones.
    #[arg(long)]
    #[serde(default)]
    pub(crate) superseded: bool,
    /// Match deprecated records instead of current ones.
    #[arg(long)]
    #[serde(default)]
    pub(crate) deprecated: bool,
    /// Maximum number of concurrent store connections.
    #[arg(long = ARG_MAX_CONNECTIONS, value_name = "n")]
    #[serde(default)]
    pub(crate) max_connections: Option<usize>,
    /// Rows fetched per page.
    #[arg(long = ARG_PAGE_SIZE, value_name = "n")]
    #[serde(default)]
    pub(crate) page_size: Option<u64>,
    /// Concurrent page fetches per partition.
    #[arg(long = ARG_FETCH_WORKERS, value_name = "n")]
    #[serde(default)]
    pub(crate) fetch_workers: Option<usize>,
    /// Log partition counts and page scheduling.
    #[arg(long)]
    #[serde(default)]
    pub(crate) verbose: bool,
}

impl IntersectsArgs {
    fn into_config(self) -> Result<IntersectsConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        IntersectsConfig::try_from(merged)
    }
}

/// Resolved `intersects` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IntersectsConfig {
    pub(crate) feature: Utf8PathBuf,
    pub(crate) database: Utf8PathBuf,
    pub(crate) placetype: Placetype,
    pub(crate) superseded: bool,
    pub(crate) deprecated: bool,
    pub(crate) max_connections: NonZeroUsize,
    pub(crate) page_size: NonZeroU64,
    pub(crate) fetch_workers: NonZeroUsize,
    pub(crate) verbose: bool,
}

impl IntersectsConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.feature, ARG_QUERY_FEATURE)?;
        require_existing(&self.database, ARG_DATABASE)?;
        Ok(())
    }

    /// Read the query feature and build the query from its geometry.
    pub(crate) fn build_query(&self) -> Result<IntersectsQuery, CliError> {
        let feature = load_feature(&self.feature)?;
        let query = IntersectsQuery::new(feature.geometry_text(), self.placetype.id())?
            .with_superseded(self.superseded)
            .with_deprecated(self.deprecated)
            .with_page_size(self.page_size)
            .with_workers(self.fetch_workers);
        Ok(query)
    }
}

impl TryFrom<IntersectsArgs> for IntersectsConfig {
    type Error = CliError;

    fn try_from(args: IntersectsArgs) -> Result<Self, Self::Error> {
        let feature = args.feature.ok_or(CliError::MissingArgument {
            field: ARG_QUERY_FEATURE,
            env: ENV_INTERSECTS_FEATURE,
        })?;
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_INTERSECTS_DATABASE,
        })?;
        let placetype_name = args.placetype.ok_or(CliError::MissingArgument {
            field: ARG_PLACETYPE,
            env: ENV_INTERSECTS_PLACETYPE,
        })?;
        let placetype = Placetype::by_name(&placetype_name)?;
        let page_size = args
            .page_size
            .map(|raw| NonZeroU64::new(raw).ok_or(CliError::ZeroArgument { field: ARG_PAGE_SIZE }))
            .transpose()?
            .unwrap_or(DEFAULT_PAGE_SIZE);
        Ok(Self {
            feature,
            database,
            placetype,
            superseded: args.superseded,
            deprecated: args.deprecated,
            max_connections: non_zero(args.max_connections, ARG_MAX_CONNECTIONS)?
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            page_size,
            fetch_workers: non_zero(args.fetch_workers, ARG_FETCH_WORKERS)?
                .unwrap_or(DEFAULT_FETCH_WORKERS),
            verbose: args.verbose,
        })
    }
}

pub(crate) fn run_intersects(args: IntersectsArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    init_logging(config.verbose);
    config.validate_sources()?;
    let query = config.build_query()?;
    let store = SqliteSpatialStore::open(config.database.clone())?;
    let records = build_runtime()?.block_on(execute_intersects(&config, store, query))?;
    write_records(writer, &records)
}

pub(crate) async fn execute_intersects(
    config: &IntersectsConfig,
    store: SqliteSpatialStore,
    query: IntersectsQuery,
) -> Result<Vec<StoredRecord>, CliError> {
    let budget = Arc::new(ConnectionBudget::new(
        Arc::new(store),
        config.max_connections,
    ));
    Ok(intersects(&budget, query).await?)
}

fn load_feature(path: &Utf8Path) -> Result<GeoJsonFeature, CliError> {
    let body = wof_spatial_fs::read_file(path).map_err(|source| CliError::ReadFeature {
        path: path.to_path_buf(),
        source,
    })?;
    GeoJsonFeature::decode(&body).map_err(|source| CliError::DecodeFeature {
        path: path.to_path_buf(),
        source,
    })
}

/// Write each record as one JSON object per line.
pub(crate) fn write_records(
    writer: &mut dyn Write,
    records: &[StoredRecord],
) -> Result<(), CliError> {
    for record in records {
        let line = serde_json::to_string(record).map_err(CliError::SerializeOutput)?;
        write_line(writer, &line)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<IntersectsConfig, CliError> {
    let merged = IntersectsArgs::merge_from_layers(layers).map_err(CliError::from)?;
    IntersectsConfig::try_from(merged)
}
