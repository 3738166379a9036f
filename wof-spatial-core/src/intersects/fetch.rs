//! Paginated fetch stage.
//!
//! Each partition's matches are split into pages of `page_size` rows. Every
//! page runs in its own task, gated first by a per-partition worker slot and
//! then by a connection lease. Rows and page completions fan in on a single
//! channel; the caller counts completions down and stops at the first failure.

use std::num::NonZeroU64;
use std::sync::Arc;

use log::debug;
use tokio::sync::{Semaphore, mpsc};

use super::IntersectsError;
use crate::store::codec;
use crate::{
    ConnectionBudget, IntersectsQuery, Partition, PartitionCount, SpatialStore, Statement,
    StoreError, StoredRecord,
};

enum PageMessage {
    Row(StoredRecord),
    Done,
    Failed {
        partition: Partition,
        offset: u64,
        source: StoreError,
    },
}

/// Offsets of every page needed to cover `expected` rows.
///
/// Yields `ceil(expected / page_size)` offsets, each strictly below
/// `expected`.
pub fn page_offsets(expected: u64, page_size: NonZeroU64) -> impl Iterator<Item = u64> {
    let size = page_size.get();
    (0..expected.div_ceil(size)).map(move |page| page * size)
}

/// Fetch every matching row of a single partition.
///
/// `expected` is the count reported by the count stage. The returned rows are
/// in arrival order.
pub async fn fetch_partition<S>(
    budget: &Arc<ConnectionBudget<S>>,
    partition: Partition,
    query: &IntersectsQuery,
    expected: u64,
) -> Result<Vec<StoredRecord>, IntersectsError>
where
    S: SpatialStore + ?Sized + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let pages = spawn_pages(budget, partition, query, expected, &tx);
    drop(tx);
    drain(rx, pages, expected).await
}

/// Fetch both partitions concurrently into one result list.
pub(super) async fn fetch_all<S>(
    budget: &Arc<ConnectionBudget<S>>,
    query: &IntersectsQuery,
    counts: PartitionCount,
) -> Result<Vec<StoredRecord>, IntersectsError>
where
    S: SpatialStore + ?Sized + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let mut pages = 0;
    for partition in Partition::ALL {
        let scheduled = spawn_pages(budget, partition, query, counts.get(partition), &tx);
        debug!("scheduled {scheduled} {partition} pages");
        pages += scheduled;
    }
    drop(tx);
    drain(rx, pages, counts.total()).await
}

fn spawn_pages<S>(
    budget: &Arc<ConnectionBudget<S>>,
    partition: Partition,
    query: &IntersectsQuery,
    expected: u64,
    tx: &mpsc::UnboundedSender<PageMessage>,
) -> u64
where
    S: SpatialStore + ?Sized + 'static,
{
    let slots = Arc::new(Semaphore::new(query.workers().get()));
    let mut pages = 0;
    for offset in page_offsets(expected, query.page_size()) {
        let statement = codec::page_statement(partition, query, offset);
        let shared = Arc::clone(budget);
        let worker_slots = Arc::clone(&slots);
        let sender = tx.clone();
        tokio::spawn(async move {
            let message = match fetch_page(&shared, &worker_slots, &statement, &sender).await {
                Ok(()) => PageMessage::Done,
                Err(source) => PageMessage::Failed {
                    partition,
                    offset,
                    source,
                },
            };
            // The receiver is gone once the query has failed; late pages are dropped.
            sender.send(message).ok();
        });
        pages += 1;
    }
    pages
}

async fn fetch_page<S>(
    budget: &ConnectionBudget<S>,
    slots: &Arc<Semaphore>,
    statement: &Statement,
    tx: &mpsc::UnboundedSender<PageMessage>,
) -> Result<(), StoreError>
where
    S: SpatialStore + ?Sized,
{
    let _slot = slots
        .acquire()
        .await
        .map_err(|_| StoreError::PoolClosed {
            pool: "fetch workers",
        })?;
    let rows = {
        let lease = budget.acquire().await?;
        lease.query_rows(statement).await?
    };
    for row in &rows {
        let record = codec::decode_row(row)?;
        if tx.send(PageMessage::Row(record)).is_err() {
            break;
        }
    }
    Ok(())
}

async fn drain(
    mut rx: mpsc::UnboundedReceiver<PageMessage>,
    pages: u64,
    expected: u64,
) -> Result<Vec<StoredRecord>, IntersectsError> {
    let mut records = Vec::with_capacity(usize::try_from(expected).unwrap_or_default());
    let mut remaining = pages;
    while remaining > 0 {
        match rx.recv().await {
            Some(PageMessage::Row(record)) => records.push(record),
            Some(PageMessage::Done) => remaining -= 1,
            Some(PageMessage::Failed {
                partition,
                offset,
                source,
            }) => {
                return Err(IntersectsError::Fetch {
                    partition,
                    offset,
                    source,
                });
            }
            None => return Err(IntersectsError::TaskLost { stage: "fetch" }),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 10, vec![])]
    #[case(10, 10, vec![0])]
    #[case(11, 10, vec![0, 10])]
    #[case(25, 10, vec![0, 10, 20])]
    fn offsets_cover_expected_rows(
        #[case] expected: u64,
        #[case] page_size: u64,
        #[case] offsets: Vec<u64>,
    ) {
        let size = NonZeroU64::new(page_size).expect("non-zero");
        assert_eq!(page_offsets(expected, size).collect::<Vec<_>>(), offsets);
    }

    proptest! {
        #[test]
        fn offsets_partition_the_range(expected in 0u64..50_000, page_size in 1u64..5_000) {
            let size = NonZeroU64::new(page_size).expect("non-zero");
            let offsets: Vec<u64> = page_offsets(expected, size).collect();
            prop_assert_eq!(offsets.len() as u64, expected.div_ceil(page_size));
            prop_assert!(offsets.iter().all(|offset| *offset < expected));
            let covered: u64 = offsets
                .iter()
                .map(|offset| page_size.min(expected - offset))
                .sum();
            prop_assert_eq!(covered, expected);
        }
    }
}
