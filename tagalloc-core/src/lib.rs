//! # tagalloc-core
//!
//! Tagged allocation tracking for memory-constrained devices.
//!
//! Wraps an allocation primitive and keeps a compact side table recording
//! every live allocation's size, 4-byte tag, creation time and address, so
//! live memory can be counted and dumped at runtime on a target with no heap
//! introspection.
//!
//! ```no_run
//! use tagalloc_core::prelude::*;
//!
//! let tracker = TagTracker::new(&TrackerConfig::default()).expect("tracker");
//! let obj = tracker.allocate_one::<u64>(b"abcd");
//! let array = tracker.allocate_array::<f32>(32, b"FlAr");
//! assert_eq!(tracker.count(), 2);
//! tracker.dump(&mut std::io::stdout()).expect("stdout");
//! tracker.free(obj);
//! tracker.free(array);
//! ```
//!
//! ### Key Submodules:
//! - `table`: slot storage, first-fit insert, compaction and resizing
//! - `guard`: the reentrant, bounded-wait table lock
//! - `stats`: locked counts, snapshots and the text dump
//! - `tracker`: the allocate/free surface and owning handles
//! - `global`: an optional process-wide tracker

pub mod clock;
pub mod error;
pub mod global;
pub mod guard;
pub mod raw;
pub mod record;
pub mod stats;
pub mod table;
pub mod tag;
pub mod tracker;

pub use tagalloc_config::{FailurePolicy, TrackerConfig};

pub mod prelude {
    pub use crate::clock::*;
    pub use crate::error::*;
    pub use crate::raw::*;
    pub use crate::stats::*;
    pub use crate::tag::Tag;
    pub use crate::tracker::*;
    pub use crate::{FailurePolicy, TrackerConfig};
}

pub use error::TrackerError;
pub use tracker::{TagTracker, Tracked};
