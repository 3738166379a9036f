//! Records persisted in the spatial store and the queries run against them.

use std::fmt;
use std::num::{NonZeroU64, NonZeroUsize};

use serde::Serialize;
use thiserror::Error;

/// Default number of rows requested per page by the fetch stage.
pub const DEFAULT_PAGE_SIZE: NonZeroU64 = match NonZeroU64::new(10_000) {
    Some(size) => size,
    None => NonZeroU64::MIN,
};

/// Default number of concurrent page fetchers per partition.
pub const DEFAULT_FETCH_WORKERS: NonZeroUsize = match NonZeroUsize::new(4) {
    Some(workers) => workers,
    None => NonZeroUsize::MIN,
};

/// Field values used to build a [`StoredRecord`].
///
/// Empty `geometry` or `centroid` strings mean "absent".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordParts {
    /// Feature identifier.
    pub id: i64,
    /// Identifier of the parent feature (`-1` when unknown).
    pub parent_id: i64,
    /// Resolved placetype identifier.
    pub placetype_id: i64,
    /// Whether the feature has been superseded.
    pub is_superseded: bool,
    /// Whether the feature has been deprecated.
    pub is_deprecated: bool,
    /// Serialized JSON metadata blob.
    pub meta: String,
    /// Digest of the source geometry.
    pub geom_hash: String,
    /// Unix timestamp (seconds) of the last write.
    pub lastmod: i64,
    /// Serialized GeoJSON geometry.
    pub geometry: String,
    /// Serialized GeoJSON point.
    pub centroid: String,
}

/// Errors returned by [`StoredRecord::new`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// Neither a geometry nor a centroid was supplied.
    #[error("record {id} has neither a geometry nor a centroid")]
    MissingGeometry {
        /// Identifier of the offending record.
        id: i64,
    },
}

/// A feature row as held by the spatial store.
///
/// Records are immutable once built. They are assembled either from a store
/// row on read or from a decoded feature before a write.
///
/// # Examples
///
/// ```
/// use wof_spatial_core::{RecordParts, StoredRecord, UpsertShape};
///
/// # fn main() -> Result<(), wof_spatial_core::RecordError> {
/// let record = StoredRecord::new(RecordParts {
///     id: 85_632_793,
///     centroid: r#"{"type":"Point","coordinates":[-0.12,51.5]}"#.into(),
///     ..RecordParts::default()
/// })?;
/// assert_eq!(record.upsert_shape(), UpsertShape::CentroidOnly);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRecord {
    id: i64,
    parent_id: i64,
    placetype_id: i64,
    is_superseded: bool,
    is_deprecated: bool,
    meta: String,
    geom_hash: String,
    lastmod: i64,
    geometry: String,
    centroid: String,
}

impl StoredRecord {
    /// Validates and constructs a [`StoredRecord`].
    pub fn new(parts: RecordParts) -> Result<Self, RecordError> {
        if parts.geometry.is_empty() && parts.centroid.is_empty() {
            return Err(RecordError::MissingGeometry { id: parts.id });
        }
        let RecordParts {
            id,
            parent_id,
            placetype_id,
            is_superseded,
            is_deprecated,
            meta,
            geom_hash,
            lastmod,
            geometry,
            centroid,
        } = parts;
        Ok(Self {
            id,
            parent_id,
            placetype_id,
            is_superseded,
            is_deprecated,
            meta,
            geom_hash,
            lastmod,
            geometry,
            centroid,
        })
    }

    /// Feature identifier.
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.id
    }

    /// Parent feature identifier.
    #[must_use]
    pub const fn parent_id(&self) -> i64 {
        self.parent_id
    }

    /// Placetype identifier.
    #[must_use]
    pub const fn placetype_id(&self) -> i64 {
        self.placetype_id
    }

    /// Whether the feature has been superseded.
    #[must_use]
    pub const fn is_superseded(&self) -> bool {
        self.is_superseded
    }

    /// Whether the feature has been deprecated.
    #[must_use]
    pub const fn is_deprecated(&self) -> bool {
        self.is_deprecated
    }

    /// Serialized metadata blob.
    #[must_use]
    pub fn meta(&self) -> &str {
        &self.meta
    }

    /// Digest of the source geometry.
    #[must_use]
    pub fn geom_hash(&self) -> &str {
        &self.geom_hash
    }

    /// Unix timestamp of the last write.
    #[must_use]
    pub const fn lastmod(&self) -> i64 {
        self.lastmod
    }

    /// Serialized geometry, empty for centroid-only records.
    #[must_use]
    pub fn geometry(&self) -> &str {
        &self.geometry
    }

    /// Serialized centroid, empty when none was derived.
    #[must_use]
    pub fn centroid(&self) -> &str {
        &self.centroid
    }

    /// The partition this record is counted in by intersects queries.
    #[must_use]
    pub fn partition(&self) -> Partition {
        if self.geometry.is_empty() {
            Partition::CentroidOnly
        } else {
            Partition::Geometry
        }
    }

    /// Which spatial columns an upsert of this record writes.
    #[must_use]
    pub fn upsert_shape(&self) -> UpsertShape {
        match (self.geometry.is_empty(), self.centroid.is_empty()) {
            (false, false) => UpsertShape::GeometryAndCentroid,
            (false, true) => UpsertShape::GeometryOnly,
            _ => UpsertShape::CentroidOnly,
        }
    }
}

/// Spatial columns written by an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertShape {
    /// Both `geom` and `centroid` are written.
    GeometryAndCentroid,
    /// Only `geom` is written; `centroid` is cleared.
    GeometryOnly,
    /// Only `centroid` is written; `geom` is cleared.
    CentroidOnly,
}

/// One of the two disjoint subsets searched by an intersects query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Partition {
    /// Records carrying a polygon geometry.
    Geometry,
    /// Records represented only by a centroid point.
    CentroidOnly,
}

impl Partition {
    /// Both partitions, in the order they are scheduled.
    pub const ALL: [Self; 2] = [Self::Geometry, Self::CentroidOnly];
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Geometry => f.write_str("geometry"),
            Self::CentroidOnly => f.write_str("centroid-only"),
        }
    }
}

/// Matching row counts per partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionCount {
    geometry: u64,
    centroid_only: u64,
}

impl PartitionCount {
    /// Build a count from both partition totals.
    #[must_use]
    pub const fn new(geometry: u64, centroid_only: u64) -> Self {
        Self {
            geometry,
            centroid_only,
        }
    }

    /// Count for a single partition.
    #[must_use]
    pub const fn get(&self, partition: Partition) -> u64 {
        match partition {
            Partition::Geometry => self.geometry,
            Partition::CentroidOnly => self.centroid_only,
        }
    }

    pub(crate) const fn set(&mut self, partition: Partition, count: u64) {
        match partition {
            Partition::Geometry => self.geometry = count,
            Partition::CentroidOnly => self.centroid_only = count,
        }
    }

    /// Sum of both partitions.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.geometry.saturating_add(self.centroid_only)
    }
}

/// Errors returned by [`IntersectsQuery::new`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntersectsQueryError {
    /// The geometry predicate was empty.
    #[error("intersects query requires a geometry")]
    EmptyGeometry,
}

/// Parameters of an intersects query.
///
/// The placetype filter is resolved by the caller before the query is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntersectsQuery {
    geometry: String,
    placetype_id: i64,
    is_superseded: bool,
    is_deprecated: bool,
    page_size: NonZeroU64,
    workers: NonZeroUsize,
}

impl IntersectsQuery {
    /// Build a query for live (not superseded, not deprecated) records.
    pub fn new(
        geometry: impl Into<String>,
        placetype_id: i64,
    ) -> Result<Self, IntersectsQueryError> {
        let geometry = geometry.into();
        if geometry.trim().is_empty() {
            return Err(IntersectsQueryError::EmptyGeometry);
        }
        Ok(Self {
            geometry,
            placetype_id,
            is_superseded: false,
            is_deprecated: false,
            page_size: DEFAULT_PAGE_SIZE,
            workers: DEFAULT_FETCH_WORKERS,
        })
    }

    /// Filter on the superseded flag.
    #[must_use]
    pub const fn with_superseded(mut self, is_superseded: bool) -> Self {
        self.is_superseded = is_superseded;
        self
    }

    /// Filter on the deprecated flag.
    #[must_use]
    pub const fn with_deprecated(mut self, is_deprecated: bool) -> Self {
        self.is_deprecated = is_deprecated;
        self
    }

    /// Set the number of rows fetched per page.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: NonZeroU64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the number of concurrent page fetchers per partition.
    #[must_use]
    pub const fn with_workers(mut self, workers: NonZeroUsize) -> Self {
        self.workers = workers;
        self
    }

    /// Serialized geometry predicate.
    #[must_use]
    pub fn geometry(&self) -> &str {
        &self.geometry
    }

    /// Placetype filter.
    #[must_use]
    pub const fn placetype_id(&self) -> i64 {
        self.placetype_id
    }

    /// Superseded filter.
    #[must_use]
    pub const fn is_superseded(&self) -> bool {
        self.is_superseded
    }

    /// Deprecated filter.
    #[must_use]
    pub const fn is_deprecated(&self) -> bool {
        self.is_deprecated
    }

    /// Rows per page.
    #[must_use]
    pub const fn page_size(&self) -> NonZeroU64 {
        self.page_size
    }

    /// Concurrent fetchers per partition.
    #[must_use]
    pub const fn workers(&self) -> NonZeroUsize {
        self.workers
    }
}
