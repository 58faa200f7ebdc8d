//! ## tagalloc-telemetry::logging
//! **Subscriber installation for hosted tools**
//!
//! The tracker crates only emit `tracing` events. Binaries call
//! [`LogSetup::init`] once to print them.

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

#[derive(Clone, Copy, Debug, Default)]
pub struct LogSetup;

impl LogSetup {
    /// Install a formatting subscriber filtered by `RUST_LOG`, falling back
    /// to `info`. Later calls are ignored.
    pub fn init() {
        Self::init_with_default(DEFAULT_FILTER)
    }

    /// As [`LogSetup::init`] with a different fallback filter, e.g. `debug`
    /// to see table resizes.
    pub fn init_with_default(directives: &str) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
        let installed = fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init()
            .is_ok();
        if installed {
            tracing::debug!(fallback = directives, "log subscriber installed");
        }
    }
}
