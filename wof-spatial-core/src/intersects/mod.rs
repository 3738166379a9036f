//! Intersects queries against the spatial store.
//!
//! A query runs in two stages. [`count_partitions`] counts the matches of
//! both partitions concurrently; then every non-empty partition is fetched
//! page by page through a bounded pool of fetchers (see [`fetch_partition`]).
//! Rows from both partitions are merged in arrival order. The first error
//! from either stage fails the whole query; no partial result is returned.

use std::sync::Arc;

use log::{debug, info};
use thiserror::Error;

use crate::{ConnectionBudget, IntersectsQuery, Partition, SpatialStore, StoreError, StoredRecord};

mod count;
mod fetch;
#[cfg(test)]
mod tests;

pub use count::count_partitions;
pub use fetch::{fetch_partition, page_offsets};

/// Errors returned by [`intersects`].
#[derive(Debug, Error)]
pub enum IntersectsError {
    /// Counting a partition failed.
    #[error("counting {partition} matches failed: {source}")]
    Count {
        /// Partition being counted.
        partition: Partition,
        /// Store failure.
        #[source]
        source: StoreError,
    },
    /// Fetching a page failed.
    #[error("fetching {partition} page at offset {offset} failed: {source}")]
    Fetch {
        /// Partition being fetched.
        partition: Partition,
        /// Offset of the failing page.
        offset: u64,
        /// Store or row decoding failure.
        #[source]
        source: StoreError,
    },
    /// A stage task ended without reporting its result.
    #[error("a {stage} task ended without reporting")]
    TaskLost {
        /// Stage the task belonged to.
        stage: &'static str,
    },
}

/// Return every stored record matching `query`.
///
/// # Examples
///
/// ```ignore
/// use std::num::NonZeroUsize;
/// use std::sync::Arc;
/// use wof_spatial_core::test_support::MemoryStore;
/// use wof_spatial_core::{ConnectionBudget, IntersectsQuery, intersects};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let budget = Arc::new(ConnectionBudget::new(
///     Arc::new(MemoryStore::default()),
///     NonZeroUsize::MIN,
/// ));
/// let query = IntersectsQuery::new(r#"{"type":"Point","coordinates":[0,0]}"#, 102_312_307)?;
/// assert!(intersects(&budget, query).await?.is_empty());
/// # Ok(())
/// # }
/// ```
pub async fn intersects<S>(
    budget: &Arc<ConnectionBudget<S>>,
    query: IntersectsQuery,
) -> Result<Vec<StoredRecord>, IntersectsError>
where
    S: SpatialStore + ?Sized + 'static,
{
    let counts = count_partitions(budget, &query).await?;
    debug!(
        "intersects counts: {} geometry, {} centroid-only",
        counts.get(Partition::Geometry),
        counts.get(Partition::CentroidOnly)
    );
    if counts.total() == 0 {
        info!("intersects matched 0 records");
        return Ok(Vec::new());
    }
    let records = fetch::fetch_all(budget, &query, counts).await?;
    info!("intersects matched {} records", records.len());
    Ok(records)
}
