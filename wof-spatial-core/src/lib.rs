//! Core domain types and dispatch engine for the wof-spatial store.
//!
//! The crate covers the parts of the system that coordinate concurrent work
//! against a relational spatial store:
//!
//! - [`ConnectionBudget`] bounds the number of in-flight store operations.
//! - The row codec in [`store`] maps store rows to [`StoredRecord`] values and
//!   records back to SQL parameter lists.
//! - [`intersects`] counts both [`Partition`]s concurrently, then fetches every
//!   matching row page by page through a throttled pool of fetchers.
//! - [`index_many`] drives a stream of [`WorkItem`]s through a fixed-size
//!   worker pool, isolating per-item failures.
//!
//! Decoding raw documents and executing SQL are left to collaborators behind
//! the [`Feature`] and [`SpatialStore`] traits.

#![forbid(unsafe_code)]

mod budget;
mod feature;
pub mod geometry;
pub mod intersects;
mod pipeline;
pub mod placetype;
mod record;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use budget::{ConnectionBudget, ConnectionLease};
pub use feature::{Feature, Hierarchy};
pub use geometry::{GeoJsonGeometry, GeometryError, GeometryShape};
pub use intersects::{IntersectsError, intersects};
pub use pipeline::{
    IndexFailure, IndexOutcome, IndexSummary, Indexer, WorkItem, default_worker_count, index_many,
};
pub use placetype::{Placetype, PlacetypeError};
pub use record::{
    DEFAULT_FETCH_WORKERS, DEFAULT_PAGE_SIZE, IntersectsQuery, IntersectsQueryError, Partition,
    PartitionCount, RecordError, RecordParts, StoredRecord, UpsertShape,
};
pub use store::{RowError, SpatialStore, SqlValue, Statement, StoreError, StoreRow};
