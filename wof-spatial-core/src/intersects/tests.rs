//! Engine tests driving `intersects` against the in-memory store.

use std::num::{NonZeroU64, NonZeroUsize};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use rstest::{fixture, rstest};

use super::*;
use crate::test_support::{MemoryStore, sample_record};

const LOCALITY: i64 = 102_312_317;
const COUNTY: i64 = 102_312_313;
const SQUARE: &str = r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}"#;

fn nz64(value: u64) -> NonZeroU64 {
    NonZeroU64::new(value).expect("non-zero page size")
}

fn nz(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).expect("non-zero count")
}

fn budget(store: MemoryStore, capacity: usize) -> Arc<ConnectionBudget<MemoryStore>> {
    Arc::new(ConnectionBudget::new(Arc::new(store), nz(capacity)))
}

fn locality_query() -> IntersectsQuery {
    IntersectsQuery::new(SQUARE, LOCALITY).expect("valid query")
}

fn sorted_ids(records: &[StoredRecord]) -> Vec<i64> {
    let mut ids: Vec<i64> = records.iter().map(StoredRecord::id).collect();
    ids.sort_unstable();
    ids
}

/// Five polygon localities, three centroid-only localities and noise that
/// the filters must exclude.
#[fixture]
fn mixed_store() -> MemoryStore {
    let mut records: Vec<StoredRecord> =
        (1..=5).map(|id| sample_record(id, LOCALITY, false)).collect();
    records.extend((6..=8).map(|id| sample_record(id, LOCALITY, true)));
    records.extend((9..=10).map(|id| sample_record(id, COUNTY, false)));
    MemoryStore::with_records(records)
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_matches_skip_the_fetch_stage() {
    let budget = budget(MemoryStore::default(), 4);
    let records = intersects(&budget, locality_query()).await.expect("query succeeds");
    assert!(records.is_empty());
    assert_eq!(budget.store().count_calls(), 2);
    assert_eq!(budget.store().page_calls(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn both_partitions_are_merged(mixed_store: MemoryStore) {
    let budget = budget(mixed_store, 3);
    let query = locality_query()
        .with_page_size(nz64(2))
        .with_workers(nz(2));
    let records = intersects(&budget, query).await.expect("query succeeds");
    assert_eq!(sorted_ids(&records), (1..=8).collect::<Vec<_>>());
    // ceil(5 / 2) geometry pages plus ceil(3 / 2) centroid pages.
    assert_eq!(budget.store().page_calls(), 5);
}

#[rstest]
#[case(Partition::Geometry)]
#[case(Partition::CentroidOnly)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn count_failure_fails_the_query(mixed_store: MemoryStore, #[case] failing: Partition) {
    let budget = budget(mixed_store.failing_count(failing), 2);
    let err = intersects(&budget, locality_query())
        .await
        .expect_err("count failure surfaces");
    assert!(matches!(err, IntersectsError::Count { partition, .. } if partition == failing));
    assert_eq!(budget.store().page_calls(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn page_failure_fails_the_query(mixed_store: MemoryStore) {
    let budget = budget(mixed_store.failing_page(Partition::Geometry, 2), 2);
    let query = locality_query().with_page_size(nz64(2));
    let err = intersects(&budget, query)
        .await
        .expect_err("page failure surfaces");
    assert!(matches!(
        err,
        IntersectsError::Fetch {
            partition: Partition::Geometry,
            offset: 2,
            ..
        }
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn filters_select_deprecated_records() {
    let deprecated = StoredRecord::new(crate::RecordParts {
        id: 42,
        placetype_id: LOCALITY,
        is_deprecated: true,
        centroid: r#"{"type":"Point","coordinates":[0.5,0.5]}"#.into(),
        ..crate::RecordParts::default()
    })
    .expect("valid record");
    let store = MemoryStore::with_records([deprecated, sample_record(1, LOCALITY, false)]);
    let budget = budget(store, 2);
    let records = intersects(&budget, locality_query().with_deprecated(true))
        .await
        .expect("query succeeds");
    assert_eq!(sorted_ids(&records), vec![42]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_operations_never_exceed_the_budget() {
    let records = (1..=24).map(|id| sample_record(id, LOCALITY, id % 3 == 0));
    let store = MemoryStore::with_records(records).with_latency(Duration::from_millis(2));
    let budget = budget(store, 2);
    let query = locality_query().with_page_size(nz64(1)).with_workers(nz(8));
    let found = intersects(&budget, query).await.expect("query succeeds");
    assert_eq!(found.len(), 24);
    assert!(budget.peak_in_flight() <= 2);
    assert!(budget.store().peak_active() <= 2);
    assert_eq!(budget.in_flight(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_partition_fetch_returns_expected_rows(mixed_store: MemoryStore) {
    let budget = budget(mixed_store, 2);
    let query = locality_query().with_page_size(nz64(2));
    let records = fetch_partition(&budget, Partition::CentroidOnly, &query, 3)
        .await
        .expect("fetch succeeds");
    assert_eq!(sorted_ids(&records), vec![6, 7, 8]);
    assert_eq!(budget.store().page_calls(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn union_of_pages_is_every_match_once(
        geometry_rows in 0i64..40,
        centroid_rows in 0i64..40,
        page_size in 1u64..12,
        workers in 1usize..6,
    ) {
        let records = (0..geometry_rows)
            .map(|id| sample_record(id + 1, LOCALITY, false))
            .chain((0..centroid_rows).map(|id| sample_record(id + 1_000, LOCALITY, true)));
        let expected: Vec<i64> = (0..geometry_rows)
            .map(|id| id + 1)
            .chain((0..centroid_rows).map(|id| id + 1_000))
            .collect();
        let budget = budget(MemoryStore::with_records(records), 3);
        let query = locality_query()
            .with_page_size(nz64(page_size))
            .with_workers(nz(workers));
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("runtime");
        let found = runtime
            .block_on(intersects(&budget, query))
            .expect("query succeeds");

        let pages = u64::try_from(geometry_rows).expect("positive").div_ceil(page_size)
            + u64::try_from(centroid_rows).expect("positive").div_ceil(page_size);
        prop_assert_eq!(sorted_ids(&found), expected);
        prop_assert_eq!(budget.store().page_calls() as u64, pages);
        prop_assert!(budget.peak_in_flight() <= 3);
    }
}
