//! Count stage: one count per partition, issued concurrently.

use std::sync::Arc;

use log::debug;
use tokio::sync::mpsc;

use super::IntersectsError;
use crate::store::codec;
use crate::{
    ConnectionBudget, IntersectsQuery, Partition, PartitionCount, SpatialStore, Statement,
    StoreError,
};

/// Count the matches of `query` in both partitions.
///
/// Each partition is counted by its own task holding its own lease. The first
/// failure is returned as soon as it arrives; the sibling's result is dropped.
pub async fn count_partitions<S>(
    budget: &Arc<ConnectionBudget<S>>,
    query: &IntersectsQuery,
) -> Result<PartitionCount, IntersectsError>
where
    S: SpatialStore + ?Sized + 'static,
{
    let (tx, mut rx) = mpsc::channel(Partition::ALL.len());
    for partition in Partition::ALL {
        let sender = tx.clone();
        let shared = Arc::clone(budget);
        let statement = codec::count_statement(partition, query);
        tokio::spawn(async move {
            let result = count_one(&shared, &statement).await;
            if sender.send((partition, result)).await.is_err() {
                debug!("count for {partition} finished after the query completed");
            }
        });
    }
    drop(tx);

    let mut counts = PartitionCount::default();
    for _ in Partition::ALL {
        let Some((partition, result)) = rx.recv().await else {
            return Err(IntersectsError::TaskLost { stage: "count" });
        };
        let count = result.map_err(|source| IntersectsError::Count { partition, source })?;
        counts.set(partition, count);
    }
    Ok(counts)
}

async fn count_one<S>(
    budget: &ConnectionBudget<S>,
    statement: &Statement,
) -> Result<u64, StoreError>
where
    S: SpatialStore + ?Sized,
{
    let lease = budget.acquire().await?;
    lease.query_count(statement).await
}
