//! Indexing and intersects queries sharing one connection budget.

use std::num::{NonZeroU64, NonZeroUsize};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream;
use rstest::rstest;
use wof_spatial_core::test_support::{MemoryStore, sample_record};
use wof_spatial_core::{ConnectionBudget, IntersectsQuery, WorkItem, index_many, intersects};
use wof_spatial_data::{FeatureIndexer, IndexOptions};

const LOCALITY: i64 = 102_312_317;
const VENUE: i64 = 102_312_325;
const SQUARE: &str = r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}"#;

fn venue(id: i64) -> WorkItem {
    WorkItem::Document {
        source: format!("venue-{id}"),
        body: format!(
            r#"{{"properties":{{"wof:id":{id},"wof:placetype":"venue","wof:repo":"whosonfirst-data-venue-xx"}},
                "geometry":{{"type":"Point","coordinates":[0.5,0.5]}}}}"#
        )
        .into_bytes(),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn indexing_and_queries_stay_within_the_budget() {
    let capacity = NonZeroUsize::new(3).expect("non-zero");
    let localities = (1..=30).map(|id| sample_record(id, LOCALITY, id % 4 == 0));
    let store = MemoryStore::with_records(localities).with_latency(Duration::from_millis(2));
    let budget = Arc::new(ConnectionBudget::new(Arc::new(store), capacity));

    let indexer = Arc::new(FeatureIndexer::new(
        Arc::clone(&budget),
        IndexOptions::default(),
    ));
    let items = stream::iter((1_000..1_040).map(|id| Ok(venue(id))));
    let query = IntersectsQuery::new(SQUARE, LOCALITY)
        .expect("valid query")
        .with_page_size(NonZeroU64::new(2).expect("non-zero"))
        .with_workers(NonZeroUsize::new(8).expect("non-zero"));

    let (summary, found) = tokio::join!(
        index_many(items, NonZeroUsize::new(8).expect("non-zero"), indexer),
        intersects(&budget, query),
    );

    assert_eq!(summary.succeeded, 40, "unexpected summary {summary:?}");
    assert_eq!(found.expect("query succeeds").len(), 30);
    assert!(budget.peak_in_flight() <= capacity.get());
    assert!(budget.store().peak_active() <= capacity.get());
    assert_eq!(budget.in_flight(), 0);
    let venues = budget
        .store()
        .records()
        .iter()
        .filter(|record| record.placetype_id() == VENUE)
        .count();
    assert_eq!(venues, 40);
}
