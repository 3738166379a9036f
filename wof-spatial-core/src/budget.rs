//! Connection budget bounding concurrent store operations.
//!
//! A [`ConnectionBudget`] owns the shared store handle together with a
//! counting semaphore. Every store call goes through a [`ConnectionLease`],
//! so the number of operations running against the store never exceeds the
//! configured capacity.

use std::num::NonZeroUsize;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::StoreError;

/// Permit pool guarding a shared store handle.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
/// use std::sync::Arc;
/// use wof_spatial_core::ConnectionBudget;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), wof_spatial_core::StoreError> {
/// let budget = ConnectionBudget::new(Arc::new(String::from("store")), NonZeroUsize::MIN);
/// let lease = budget.acquire().await?;
/// assert_eq!(lease.as_str(), "store");
/// assert_eq!(budget.in_flight(), 1);
/// drop(lease);
/// assert_eq!(budget.in_flight(), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConnectionBudget<S: ?Sized> {
    store: Arc<S>,
    semaphore: Semaphore,
    capacity: NonZeroUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl<S: ?Sized> ConnectionBudget<S> {
    /// Wrap `store` in a budget of `capacity` permits.
    #[must_use]
    pub fn new(store: Arc<S>, capacity: NonZeroUsize) -> Self {
        Self {
            store,
            semaphore: Semaphore::new(capacity.get()),
            capacity,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Wait for a free permit and lease the store.
    ///
    /// The permit is returned when the lease is dropped.
    pub async fn acquire(&self) -> Result<ConnectionLease<'_, S>, StoreError> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| StoreError::PoolClosed {
                pool: "connection budget",
            })?;
        let current = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::AcqRel);
        Ok(ConnectionLease {
            budget: self,
            _permit: permit,
        })
    }

    /// Maximum number of concurrent leases.
    #[must_use]
    pub const fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    /// Leases currently held.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of leases held at once since construction.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Acquire)
    }

    /// Shared store handle, without taking a permit.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

/// A held permit; dereferences to the shared store.
#[derive(Debug)]
pub struct ConnectionLease<'a, S: ?Sized> {
    budget: &'a ConnectionBudget<S>,
    _permit: SemaphorePermit<'a>,
}

impl<S: ?Sized> Deref for ConnectionLease<'_, S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &self.budget.store
    }
}

impl<S: ?Sized> Drop for ConnectionLease<'_, S> {
    fn drop(&mut self) {
        self.budget.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
