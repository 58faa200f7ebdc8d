//! The table lock.
//!
//! A reentrant mutex with a bounded wait. Running out the wait is reported as
//! [`TrackerError::LockTimeout`]; the tracker treats that as fatal rather than
//! retrying, since a table operation should never take that long.

use std::cell::RefCell;
use std::time::Duration;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::error::TrackerError;

pub struct ConcurrencyGuard<T> {
    inner: ReentrantMutex<RefCell<T>>,
    timeout: Duration,
}

impl<T> ConcurrencyGuard<T> {
    pub fn new(value: T, timeout: Duration) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(value)),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `f` with shared access. Nested reads on the owning thread are
    /// allowed.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, TrackerError> {
        let guard = self.acquire()?;
        let value = guard
            .try_borrow()
            .map_err(|_| TrackerError::ReentrantBorrow)?;
        Ok(f(&value))
    }

    /// Run `f` with exclusive access.
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, TrackerError> {
        let guard = self.acquire()?;
        let mut value = guard
            .try_borrow_mut()
            .map_err(|_| TrackerError::ReentrantBorrow)?;
        Ok(f(&mut value))
    }

    fn acquire(&self) -> Result<ReentrantMutexGuard<'_, RefCell<T>>, TrackerError> {
        self.inner
            .try_lock_for(self.timeout)
            .ok_or(TrackerError::LockTimeout(self.timeout))
    }
}
