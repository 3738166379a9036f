//! Bulk indexing pipeline.
//!
//! [`index_many`] pulls [`WorkItem`]s from a stream and runs an [`Indexer`]
//! over each one on a fixed-size pool of Tokio tasks. Item failures, panics
//! included, are logged and collected in the [`IndexSummary`]; they never stop
//! the remaining items.

use std::any::Any;
use std::error::Error as StdError;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use futures_util::{FutureExt, Stream, StreamExt};
use log::{debug, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// One unit of indexing work. Consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// A feature file on disk.
    Path(Utf8PathBuf),
    /// A feature document already in memory, such as a row of a feature table.
    Document {
        /// Human-readable origin of the document.
        source: String,
        /// Raw document bytes.
        body: Vec<u8>,
    },
}

impl WorkItem {
    /// Location reported in logs and failure lists.
    #[must_use]
    pub fn source(&self) -> String {
        match self {
            Self::Path(path) => path.to_string(),
            Self::Document { source, .. } => source.clone(),
        }
    }
}

/// Result of indexing a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// The record was written.
    Indexed,
    /// The item was deliberately not indexed.
    Skipped,
    /// Every step ran except the write.
    DryRun,
}

/// Per-item indexing operation.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Error raised for a single item.
    type Error: StdError + Send + 'static;

    /// Index one item. Repeating the call for the same feature is idempotent.
    async fn index_one(&self, item: WorkItem) -> Result<IndexOutcome, Self::Error>;
}

/// A failed item and the reason it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFailure {
    /// Location of the item.
    pub source: String,
    /// Rendered error.
    pub message: String,
}

impl IndexFailure {
    /// Pair a location with an error message.
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
        }
    }
}

/// Aggregate counts for a bulk run.
///
/// Dry-run items are counted as succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSummary {
    /// Items indexed (or fully processed in dry-run mode).
    pub succeeded: usize,
    /// Items skipped on purpose.
    pub skipped: usize,
    /// Items that failed.
    pub failed: usize,
    /// Location and error of every failed item.
    pub failures: Vec<IndexFailure>,
}

impl IndexSummary {
    fn record(&mut self, source: String, result: Result<IndexOutcome, String>) {
        match result {
            Ok(IndexOutcome::Indexed | IndexOutcome::DryRun) => self.succeeded += 1,
            Ok(IndexOutcome::Skipped) => {
                debug!("skipped {source}");
                self.skipped += 1;
            }
            Err(message) => self.record_failure(IndexFailure::new(source, message)),
        }
    }

    fn record_failure(&mut self, failure: IndexFailure) {
        warn!("failed to index {}: {}", failure.source, failure.message);
        self.failed += 1;
        self.failures.push(failure);
    }

    /// Total number of items seen.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// Default worker count: the host's available parallelism.
#[must_use]
pub fn default_worker_count() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("unknown panic"))
}

/// Index every item of `items` with at most `workers` items in flight.
///
/// Items that the source could not produce arrive as `Err` and are recorded
/// as failures directly. The call returns once every spawned task finished.
pub async fn index_many<I, St>(items: St, workers: NonZeroUsize, indexer: Arc<I>) -> IndexSummary
where
    I: Indexer + ?Sized + 'static,
    St: Stream<Item = Result<WorkItem, IndexFailure>> + Unpin,
{
    let permits = Arc::new(Semaphore::new(workers.get()));
    let mut tasks = JoinSet::new();
    let mut summary = IndexSummary::default();
    let mut items = items;

    while let Some(next) = items.next().await {
        let item = match next {
            Ok(item) => item,
            Err(failure) => {
                summary.record_failure(failure);
                continue;
            }
        };
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let worker = Arc::clone(&indexer);
        tasks.spawn(async move {
            let _permit = permit;
            let source = item.source();
            let result = AssertUnwindSafe(worker.index_one(item))
                .catch_unwind()
                .await
                .map_err(|payload| format!("panicked: {}", panic_message(payload.as_ref())))
                .and_then(|outcome| outcome.map_err(|err| err.to_string()));
            (source, result)
        });
        while let Some(joined) = tasks.try_join_next() {
            absorb(&mut summary, joined);
        }
    }

    while let Some(joined) = tasks.join_next().await {
        absorb(&mut summary, joined);
    }
    summary
}

fn absorb(
    summary: &mut IndexSummary,
    joined: Result<(String, Result<IndexOutcome, String>), tokio::task::JoinError>,
) {
    match joined {
        Ok((source, result)) => summary.record(source, result),
        Err(err) => summary.record_failure(IndexFailure::new("<unknown>", err.to_string())),
    }
}
