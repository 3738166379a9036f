//! Feature decoding, indexing and SQLite storage for wof-spatial.
//!
//! - [`GeoJsonFeature`] decodes Who's On First GeoJSON documents.
//! - [`assemble_record`] turns a decoded feature into a
//!   [`StoredRecord`](wof_spatial_core::StoredRecord).
//! - [`FeatureIndexer`] implements the per-item
//!   [`Indexer`](wof_spatial_core::Indexer) used by the bulk pipeline.
//! - [`spawn_source`] enumerates files, directories, file lists, CSV
//!   manifests and feature tables into work items.
//! - [`SqliteSpatialStore`] implements
//!   [`SpatialStore`](wof_spatial_core::SpatialStore) over a SQLite file.

#![forbid(unsafe_code)]

mod geojson;
mod indexer;
mod record;
mod source;
mod sqlite;

pub use geojson::{DecodeError, GeoJsonFeature};
pub use indexer::{FeatureIndexer, IndexError, IndexOptions};
pub use record::{GeometryMode, assemble_record, geometry_hash};
pub use source::{
    DEFAULT_CSV_COLUMN, SourceError, SourceMode, SourceOptions, Stopped, enumerate,
    is_feature_file, spawn_source,
};
pub use sqlite::{BUSY_TIMEOUT, SqliteSpatialStore, SqliteStoreError};
