//! Error types emitted by the wof-spatial CLI.
//!
//! Many helpers return `Result<_, CliError>`, so large payloads are boxed
//! or kept behind `Arc`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;
use wof_spatial_core::{IntersectsError, IntersectsQueryError, PlacetypeError};
use wof_spatial_data::{DecodeError, IndexError, SqliteStoreError};

/// Errors emitted by the wof-spatial CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// `index` was invoked without any inputs.
    #[error("no inputs given to index")]
    NoInputs,
    /// A numeric option was set to zero.
    #[error("--{field} must be greater than zero")]
    ZeroArgument { field: &'static str },
    /// A referenced input path does not exist on disk or is not a file.
    #[error("{field} path {path:?} does not exist or is not a file")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected due to an IO error.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        field: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Building the async runtime failed.
    #[error("failed to start the async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// Opening or preparing the SQLite store failed.
    #[error(transparent)]
    OpenStore(#[from] SqliteStoreError),
    /// Reading the query feature failed.
    #[error("failed to read query feature {path:?}: {source}")]
    ReadFeature {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The query feature could not be decoded.
    #[error("failed to decode query feature {path:?}: {source}")]
    DecodeFeature {
        path: Utf8PathBuf,
        #[source]
        source: DecodeError,
    },
    /// The requested placetype is not registered.
    #[error(transparent)]
    Placetype(#[from] PlacetypeError),
    /// The intersects query could not be built.
    #[error(transparent)]
    Query(#[from] IntersectsQueryError),
    /// The intersects query failed.
    #[error("intersects query failed: {0}")]
    Intersects(#[from] IntersectsError),
    /// Indexing a single input failed.
    #[error("failed to index {path:?}: {source}")]
    Index {
        path: Utf8PathBuf,
        #[source]
        source: Box<IndexError>,
    },
    /// Some inputs of a bulk run failed; the summary has been written.
    #[error("{failed} of {total} inputs failed to index")]
    PartialIndex { failed: usize, total: usize },
    /// Serializing an output row failed.
    #[error("failed to serialize output: {0}")]
    SerializeOutput(#[source] serde_json::Error),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
