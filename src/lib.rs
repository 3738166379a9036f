//! Facade crate for the wof-spatial indexing and intersects engine.
//!
//! This crate re-exports the core domain types and dispatch engine, and
//! exposes the SQLite-backed store and feature indexer behind a feature flag.

#![forbid(unsafe_code)]

pub use wof_spatial_core::{
    ConnectionBudget, ConnectionLease, Feature, GeometryShape, IndexFailure, IndexOutcome,
    IndexSummary, Indexer, IntersectsError, IntersectsQuery, Partition, PartitionCount,
    SpatialStore, Statement, StoreError, StoredRecord, WorkItem, index_many, intersects,
};

#[cfg(feature = "store-sqlite")]
pub use wof_spatial_data::{
    FeatureIndexer, GeoJsonFeature, GeometryMode, IndexError, IndexOptions, SqliteSpatialStore,
    SqliteStoreError,
};
