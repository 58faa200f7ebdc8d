use std::time::Duration;

use tagalloc_config::{ConfigError, FailurePolicy};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Allocation table lock not acquired within {0:?}")]
    LockTimeout(Duration),

    #[error("Allocation table borrowed mutably while already in use on this thread")]
    ReentrantBorrow,

    #[error("Could not allocate the allocation table ({entries} entries)")]
    TableAllocation { entries: usize },

    #[error("Could not reallocate the allocation table from {from} to {to} entries")]
    TableReallocation { from: usize, to: usize },

    #[error("No empty slot after growing the allocation table to {table_size} entries")]
    GrowthInvariant { table_size: usize },

    #[error("Resize to {requested} entries is below the minimum of {minimum}")]
    BelowMinimumSize { requested: usize, minimum: usize },

    #[error("Shrinking to {requested} entries would discard a live record at slot {slot}")]
    ShrinkWouldDiscard { requested: usize, slot: usize },

    #[error("Allocator returned no memory for a {size} byte request")]
    AllocatorExhausted { size: usize },

    #[error("Refusing to track a zero-sized allocation")]
    ZeroSizedRecord,

    #[error("Requested allocation size overflows")]
    LayoutOverflow,

    #[error("Invalid tracker configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Stop the world. Logs the fault, then aborts or panics per `policy`.
#[cold]
pub fn fatal(policy: FailurePolicy, error: TrackerError) -> ! {
    tracing::error!(error = %error, ?policy, "tagged allocation tracker fault");
    match policy {
        FailurePolicy::Abort => std::process::abort(),
        FailurePolicy::Panic => panic!("tagged allocation tracker fault: {error}"),
    }
}

/// Fail-fast unwrapping for tracker results.
pub(crate) trait OrFatal<T> {
    fn or_fatal(self, policy: FailurePolicy) -> T;
}

impl<T> OrFatal<T> for Result<T, TrackerError> {
    #[inline]
    fn or_fatal(self, policy: FailurePolicy) -> T {
        match self {
            Ok(value) => value,
            Err(error) => fatal(policy, error),
        }
    }
}
