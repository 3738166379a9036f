//! Per-item feature indexing.
//!
//! [`FeatureIndexer`] turns one [`WorkItem`] into an upsert against the
//! spatial store: read the bytes, decode the feature, assemble the stored
//! record and write it through a connection lease.

use std::io;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use camino::Utf8PathBuf;
use log::{debug, info};
use thiserror::Error;
use wof_spatial_core::store::codec;
use wof_spatial_core::{
    ConnectionBudget, Feature, GeometryError, IndexOutcome, Indexer, PlacetypeError,
    SpatialStore, StoreError, StoredRecord, WorkItem,
};

use crate::record::{GeometryMode, assemble_record};
use crate::{DecodeError, GeoJsonFeature};

/// Errors raised while indexing a single item.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Reading the item's bytes failed.
    #[error("failed to read {source_location}: {source}")]
    Read {
        /// Path of the item.
        source_location: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The blocking read task did not complete.
    #[error("reading {source_location} did not complete: {message}")]
    ReadTask {
        /// Path of the item.
        source_location: String,
        /// Join failure description.
        message: String,
    },
    /// The document could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// A property required to build the record is absent.
    #[error("feature {id} is missing {field}")]
    MissingRequiredField {
        /// Name of the absent field.
        field: &'static str,
        /// Feature identifier.
        id: i64,
    },
    /// The feature's placetype is not registered.
    #[error("feature {id}: {source}")]
    UnknownPlacetype {
        /// Feature identifier.
        id: i64,
        /// Lookup failure.
        #[source]
        source: PlacetypeError,
    },
    /// The feature's geometry could not be converted.
    #[error("feature {id} has an invalid geometry: {source}")]
    Geometry {
        /// Feature identifier.
        id: i64,
        /// Geometry failure.
        #[source]
        source: GeometryError,
    },
    /// Serializing the metadata blob failed.
    #[error("failed to serialize metadata for feature {id}: {source}")]
    SerializeMeta {
        /// Feature identifier.
        id: i64,
        /// Source error produced by `serde_json`.
        #[source]
        source: serde_json::Error,
    },
    /// Writing the record failed.
    #[error("failed to write feature {id}: {source}")]
    Store {
        /// Feature identifier.
        id: i64,
        /// Store failure.
        #[source]
        source: StoreError,
    },
}

/// Behaviour switches for [`FeatureIndexer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOptions {
    geometry_mode: GeometryMode,
    verbose: bool,
    dry_run: bool,
}

impl IndexOptions {
    /// Store polygon geometries according to `mode`.
    #[must_use]
    pub const fn with_geometry_mode(mut self, mode: GeometryMode) -> Self {
        self.geometry_mode = mode;
        self
    }

    /// Log every upsert before it is written.
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose || self.dry_run;
        self
    }

    /// Run every step except the write. Implies verbose.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self.verbose = self.verbose || dry_run;
        self
    }

    /// Configured geometry mode.
    #[must_use]
    pub const fn geometry_mode(&self) -> GeometryMode {
        self.geometry_mode
    }

    /// Whether upserts are logged.
    #[must_use]
    pub const fn verbose(&self) -> bool {
        self.verbose
    }

    /// Whether writes are skipped.
    #[must_use]
    pub const fn dry_run(&self) -> bool {
        self.dry_run
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Render an upsert for logging. The geometry literal is elided unless a
/// non-default geometry mode is active.
fn describe_upsert(record: &StoredRecord, mode: GeometryMode) -> String {
    let geometry = if record.geometry().is_empty() {
        "NULL"
    } else if mode == GeometryMode::Default {
        "..."
    } else {
        record.geometry()
    };
    let centroid = if record.centroid().is_empty() {
        "NULL"
    } else {
        record.centroid()
    };
    format!(
        "upsert whosonfirst id={} parent_id={} placetype_id={} is_superseded={} \
         is_deprecated={} meta={} geom_hash={} lastmod={} geom={geometry} centroid={centroid}",
        record.id(),
        record.parent_id(),
        record.placetype_id(),
        record.is_superseded(),
        record.is_deprecated(),
        record.meta(),
        record.geom_hash(),
        record.lastmod(),
    )
}

/// Indexes feature documents into a [`SpatialStore`].
#[derive(Debug)]
pub struct FeatureIndexer<S: ?Sized> {
    budget: Arc<ConnectionBudget<S>>,
    options: IndexOptions,
}

impl<S> FeatureIndexer<S>
where
    S: SpatialStore + ?Sized,
{
    /// Build an indexer writing through `budget`.
    #[must_use]
    pub const fn new(budget: Arc<ConnectionBudget<S>>, options: IndexOptions) -> Self {
        Self { budget, options }
    }

    /// Configured options.
    #[must_use]
    pub const fn options(&self) -> IndexOptions {
        self.options
    }

    /// Decode and upsert a document already in memory.
    pub async fn index_document(
        &self,
        source_location: &str,
        body: &[u8],
    ) -> Result<IndexOutcome, IndexError> {
        let feature = GeoJsonFeature::decode(body)?;
        let id = feature.id();
        if id == 0 {
            debug!("skipping Earth record in {source_location}");
            return Ok(IndexOutcome::Skipped);
        }
        let record = assemble_record(&feature, self.options.geometry_mode, unix_now())?;
        if self.options.verbose {
            info!("{}", describe_upsert(&record, self.options.geometry_mode));
        }
        if self.options.dry_run {
            return Ok(IndexOutcome::DryRun);
        }
        let statement = codec::upsert_statement(&record);
        let lease = self
            .budget
            .acquire()
            .await
            .map_err(|source| IndexError::Store { id, source })?;
        lease
            .execute(&statement)
            .await
            .map_err(|source| IndexError::Store { id, source })?;
        debug!("indexed {id} from {source_location}");
        Ok(IndexOutcome::Indexed)
    }
}

async fn read_path(path: Utf8PathBuf) -> Result<Vec<u8>, IndexError> {
    let source_location = path.to_string();
    tokio::task::spawn_blocking(move || wof_spatial_fs::read_file(&path))
        .await
        .map_err(|err| IndexError::ReadTask {
            source_location: source_location.clone(),
            message: err.to_string(),
        })?
        .map_err(|source| IndexError::Read {
            source_location,
            source,
        })
}

#[async_trait]
impl<S> Indexer for FeatureIndexer<S>
where
    S: SpatialStore + ?Sized + 'static,
{
    type Error = IndexError;

    async fn index_one(&self, item: WorkItem) -> Result<IndexOutcome, Self::Error> {
        let source_location = item.source();
        let body = match item {
            WorkItem::Path(path) => read_path(path).await?,
            WorkItem::Document { body, .. } => body,
        };
        self.index_document(&source_location, &body).await
    }
}
