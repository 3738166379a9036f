//! Test-only, in-memory `SpatialStore` used by unit and behaviour tests.
//!
//! The store understands exactly the statements produced by the row codec. It
//! evaluates the placetype and flag filters but treats every record as
//! intersecting the query geometry, so tests control matches through the
//! records they seed.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::store::codec::{self, SELECT_BY_ID_SQL};
use crate::{
    Partition, RecordParts, SpatialStore, SqlValue, Statement, StoreError, StoreRow, StoredRecord,
    UpsertShape,
};

/// In-memory `SpatialStore` with call counters and failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<i64, StoredRecord>>,
    latency: Option<Duration>,
    failing_counts: HashSet<Partition>,
    failing_pages: HashSet<(Partition, u64)>,
    count_calls: AtomicUsize,
    page_calls: AtomicUsize,
    execute_calls: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

struct ActiveCall<'a> {
    active: &'a AtomicUsize,
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

fn injected(operation: &'static str) -> StoreError {
    StoreError::backend(operation, "injected failure")
}

fn unsupported(statement: &Statement) -> StoreError {
    StoreError::backend("dispatch", format!("unsupported statement: {}", statement.sql()))
}

fn param(statement: &Statement, index: usize) -> Result<&SqlValue, StoreError> {
    statement
        .params()
        .get(index)
        .ok_or_else(|| StoreError::backend("bind", format!("missing parameter ?{}", index + 1)))
}

fn int_param(statement: &Statement, index: usize) -> Result<i64, StoreError> {
    match param(statement, index)? {
        SqlValue::Integer(value) => Ok(*value),
        other => Err(StoreError::backend(
            "bind",
            format!("parameter ?{} is {}", index + 1, other.kind()),
        )),
    }
}

fn text_param(statement: &Statement, index: usize) -> Result<String, StoreError> {
    match param(statement, index)? {
        SqlValue::Text(value) => Ok(value.clone()),
        SqlValue::Null => Ok(String::new()),
        other @ SqlValue::Integer(_) => Err(StoreError::backend(
            "bind",
            format!("parameter ?{} is {}", index + 1, other.kind()),
        )),
    }
}

fn partition_for(sql: &str, page: bool) -> Option<Partition> {
    Partition::ALL.into_iter().find(|partition| {
        if page {
            partition.page_sql() == sql
        } else {
            partition.count_sql() == sql
        }
    })
}

fn shape_for(sql: &str) -> Option<UpsertShape> {
    [
        UpsertShape::GeometryAndCentroid,
        UpsertShape::GeometryOnly,
        UpsertShape::CentroidOnly,
    ]
    .into_iter()
    .find(|shape| shape.sql() == sql)
}

impl MemoryStore {
    /// Create a store seeded with `records`.
    pub fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = StoredRecord>,
    {
        Self {
            records: Mutex::new(
                records
                    .into_iter()
                    .map(|record| (record.id(), record))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    /// Delay every call by `latency`, so concurrent calls overlap.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every count of `partition`.
    #[must_use]
    pub fn failing_count(mut self, partition: Partition) -> Self {
        self.failing_counts.insert(partition);
        self
    }

    /// Fail the `partition` page starting at `offset`.
    #[must_use]
    pub fn failing_page(mut self, partition: Partition, offset: u64) -> Self {
        self.failing_pages.insert((partition, offset));
        self
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<i64, StoredRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of every stored record, ordered by id.
    pub fn records(&self) -> Vec<StoredRecord> {
        self.lock().values().cloned().collect()
    }

    /// Stored record with `id`, if any.
    pub fn get(&self, id: i64) -> Option<StoredRecord> {
        self.lock().get(&id).cloned()
    }

    /// Number of count statements received.
    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::Acquire)
    }

    /// Number of row queries received.
    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::Acquire)
    }

    /// Number of write statements received.
    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::Acquire)
    }

    /// Highest number of calls observed running at once.
    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::Acquire)
    }

    async fn enter(&self) -> ActiveCall<'_> {
        let current = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_active.fetch_max(current, Ordering::AcqRel);
        let call = ActiveCall {
            active: &self.active,
        };
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        call
    }

    fn matching(
        &self,
        partition: Partition,
        statement: &Statement,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let placetype_id = int_param(statement, 1)?;
        let is_superseded = int_param(statement, 2)? != 0;
        let is_deprecated = int_param(statement, 3)? != 0;
        Ok(self
            .lock()
            .values()
            .filter(|record| record.partition() == partition)
            .filter(|record| record.placetype_id() == placetype_id)
            .filter(|record| record.is_superseded() == is_superseded)
            .filter(|record| record.is_deprecated() == is_deprecated)
            .cloned()
            .collect())
    }

    fn upsert(&self, shape: UpsertShape, statement: &Statement) -> Result<u64, StoreError> {
        let (geometry, centroid) = match shape {
            UpsertShape::GeometryAndCentroid => {
                (text_param(statement, 8)?, text_param(statement, 9)?)
            }
            UpsertShape::GeometryOnly => (text_param(statement, 8)?, String::new()),
            UpsertShape::CentroidOnly => (String::new(), text_param(statement, 8)?),
        };
        let record = StoredRecord::new(RecordParts {
            id: int_param(statement, 0)?,
            parent_id: int_param(statement, 1)?,
            placetype_id: int_param(statement, 2)?,
            is_superseded: int_param(statement, 3)? != 0,
            is_deprecated: int_param(statement, 4)? != 0,
            meta: text_param(statement, 5)?,
            geom_hash: text_param(statement, 6)?,
            lastmod: int_param(statement, 7)?,
            geometry,
            centroid,
        })
        .map_err(|err| StoreError::backend("upsert", err))?;
        self.lock().insert(record.id(), record);
        Ok(1)
    }
}

#[async_trait]
impl SpatialStore for MemoryStore {
    async fn query_count(&self, statement: &Statement) -> Result<u64, StoreError> {
        self.count_calls.fetch_add(1, Ordering::AcqRel);
        let _call = self.enter().await;
        let partition =
            partition_for(statement.sql(), false).ok_or_else(|| unsupported(statement))?;
        if self.failing_counts.contains(&partition) {
            return Err(injected("count"));
        }
        let matches = self.matching(partition, statement)?;
        Ok(u64::try_from(matches.len()).unwrap_or(u64::MAX))
    }

    async fn query_rows(&self, statement: &Statement) -> Result<Vec<StoreRow>, StoreError> {
        self.page_calls.fetch_add(1, Ordering::AcqRel);
        let _call = self.enter().await;
        if statement.sql() == SELECT_BY_ID_SQL {
            let id = int_param(statement, 0)?;
            return Ok(self.get(id).iter().map(codec::encode_row).collect());
        }
        let partition = partition_for(statement.sql(), true).ok_or_else(|| unsupported(statement))?;
        let limit = usize::try_from(int_param(statement, 4)?).unwrap_or(usize::MAX);
        let offset = int_param(statement, 5)?;
        if self
            .failing_pages
            .contains(&(partition, u64::try_from(offset).unwrap_or_default()))
        {
            return Err(injected("page"));
        }
        Ok(self
            .matching(partition, statement)?
            .iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit)
            .map(codec::encode_row)
            .collect())
    }

    async fn execute(&self, statement: &Statement) -> Result<u64, StoreError> {
        self.execute_calls.fetch_add(1, Ordering::AcqRel);
        let _call = self.enter().await;
        let shape = shape_for(statement.sql()).ok_or_else(|| unsupported(statement))?;
        self.upsert(shape, statement)
    }
}

/// Build a record in `placetype_id` with a polygon geometry or, when
/// `centroid_only` is set, a centroid point only.
pub fn sample_record(id: i64, placetype_id: i64, centroid_only: bool) -> StoredRecord {
    let centroid = r#"{"type":"Point","coordinates":[0.5,0.5]}"#;
    let geometry = if centroid_only {
        ""
    } else {
        r#"{"type":"MultiPolygon","coordinates":[[[[0,0],[1,0],[1,1],[0,1],[0,0]]]]}"#
    };
    StoredRecord::new(RecordParts {
        id,
        parent_id: -1,
        placetype_id,
        meta: "{}".into(),
        geom_hash: String::new(),
        geometry: geometry.into(),
        centroid: centroid.into(),
        ..RecordParts::default()
    })
    .unwrap_or_else(|_| unreachable!("sample records always carry a centroid"))
}
