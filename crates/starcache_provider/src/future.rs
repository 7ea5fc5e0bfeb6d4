//! Asynchronous results for provider operations.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{ProviderError, ProviderResult};

/// The asynchronous result of a provider operation.
///
/// This is the single future shape the SPI needs: a slot that is either
/// already filled ([`CacheFuture::completed`], [`CacheFuture::failed`]) or
/// filled later through the [`CachePromise`] returned by
/// [`CacheFuture::pending`]. The only consuming operation is
/// [`CacheFuture::wait_timeout`].
///
/// Waiting does not cancel anything: a timed-out operation keeps running
/// inside the provider, which is responsible for its own resources.
#[derive(Debug)]
pub struct CacheFuture<T> {
    slot: Arc<Slot<T>>,
}

/// The producing side of a pending [`CacheFuture`].
#[derive(Debug)]
pub struct CachePromise<T> {
    slot: Arc<Slot<T>>,
}

#[derive(Debug)]
struct Slot<T> {
    state: Mutex<Option<ProviderResult<T>>>,
    filled: Condvar,
}

impl<T> CacheFuture<T> {
    /// A future that already holds `value`.
    #[must_use]
    pub fn completed(value: T) -> Self {
        Self {
            slot: Arc::new(Slot {
                state: Mutex::new(Some(Ok(value))),
                filled: Condvar::new(),
            }),
        }
    }

    /// A future that already holds `error`.
    #[must_use]
    pub fn failed(error: ProviderError) -> Self {
        Self {
            slot: Arc::new(Slot {
                state: Mutex::new(Some(Err(error))),
                filled: Condvar::new(),
            }),
        }
    }

    /// An unfilled future plus the promise that fills it.
    #[must_use]
    pub fn pending() -> (Self, CachePromise<T>) {
        let slot = Arc::new(Slot {
            state: Mutex::new(None),
            filled: Condvar::new(),
        });
        (
            Self {
                slot: Arc::clone(&slot),
            },
            CachePromise { slot },
        )
    }
}

impl<T: Clone> CacheFuture<T> {
    /// Waits up to `budget` for the result.
    ///
    /// On timeout returns [`ProviderError::Timeout`] tagged with
    /// `operation`; the slot may still fill afterwards and can be waited
    /// on again.
    pub fn wait_timeout(
        &self,
        budget: Duration,
        operation: &'static str,
    ) -> ProviderResult<T> {
        let deadline = Instant::now() + budget;
        let mut state = self.slot.state.lock();
        loop {
            if let Some(result) = state.as_ref() {
                return result.clone();
            }
            let now = Instant::now();
            if now >= deadline
                || self
                    .slot
                    .filled
                    .wait_for(&mut state, deadline - now)
                    .timed_out()
            {
                if let Some(result) = state.as_ref() {
                    return result.clone();
                }
                return Err(ProviderError::Timeout { operation, budget });
            }
        }
    }
}

impl<T> CachePromise<T> {
    /// Fills the slot with a value and wakes all waiters.
    pub fn fulfill(self, value: T) {
        self.fill(Ok(value));
    }

    /// Fills the slot with an error and wakes all waiters.
    pub fn fail(self, error: ProviderError) {
        self.fill(Err(error));
    }

    fn fill(self, result: ProviderResult<T>) {
        let mut state = self.slot.state.lock();
        debug_assert!(state.is_none(), "promise fulfilled twice");
        *state = Some(result);
        self.slot.filled.notify_all();
    }
}
