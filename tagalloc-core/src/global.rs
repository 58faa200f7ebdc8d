//! A process-wide tracker for code that cannot thread a context through.
//!
//! Only the first [`initialize`] call builds the tracker; later calls return
//! it unchanged, whatever config they pass.

use once_cell::sync::OnceCell;
use tagalloc_config::TrackerConfig;

use crate::error::{fatal, TrackerError};
use crate::tracker::TagTracker;

static TRACKER: OnceCell<TagTracker> = OnceCell::new();

/// Build the process-wide tracker if needed. Fatal on failure.
pub fn initialize(config: &TrackerConfig) -> &'static TagTracker {
    TRACKER.get_or_init(|| {
        TagTracker::new(config).unwrap_or_else(|error| fatal(config.failure_policy, error))
    })
}

pub fn try_initialize(config: &TrackerConfig) -> Result<&'static TagTracker, TrackerError> {
    TRACKER.get_or_try_init(|| TagTracker::new(config))
}

/// The process-wide tracker, if it has been initialized.
pub fn get() -> Option<&'static TagTracker> {
    TRACKER.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_is_idempotent() {
        let first = initialize(&TrackerConfig::default());
        let other = TrackerConfig {
            initial_table_size: 256,
            ..TrackerConfig::default()
        };
        let second = try_initialize(&other).unwrap();

        assert!(std::ptr::eq(first, second));
        assert!(std::ptr::eq(first, get().unwrap()));
        assert!(first.table_size() < 256);

        let handle = first.allocate_one::<u32>(b"GLOB");
        assert!(first.count() >= 1);
        first.free(handle);
    }
}
