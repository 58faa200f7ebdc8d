//! ## tagalloc-telemetry::metrics
//! **Prometheus gauges fed from tracker statistics**
//!
//! Gauges are pulled, not pushed: call [`AllocationMetrics::observe`] with a
//! fresh [`TrackerStats`] before scraping.

use prometheus::{Encoder, IntGauge, Registry, TextEncoder};
use tagalloc_core::stats::TrackerStats;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Metrics exposition was not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Clone)]
pub struct AllocationMetrics {
    pub registry: Registry,
    pub live_allocations: IntGauge,
    pub tracked_bytes: IntGauge,
    pub table_entries: IntGauge,
    pub table_bytes: IntGauge,
    pub table_grows: IntGauge,
    pub table_shrinks: IntGauge,
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, MetricsError> {
    let gauge = IntGauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn clamp<T: TryInto<i64>>(value: T) -> i64 {
    value.try_into().unwrap_or(i64::MAX)
}

impl AllocationMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        Self::with_registry(Registry::new())
    }

    /// Register the gauges on an existing registry.
    pub fn with_registry(registry: Registry) -> Result<Self, MetricsError> {
        Ok(Self {
            live_allocations: gauge(
                &registry,
                "tagalloc_live_allocations",
                "Allocations currently tracked",
            )?,
            tracked_bytes: gauge(
                &registry,
                "tagalloc_tracked_bytes",
                "Bytes held by tracked allocations",
            )?,
            table_entries: gauge(
                &registry,
                "tagalloc_table_entries",
                "Slots in the allocation table",
            )?,
            table_bytes: gauge(
                &registry,
                "tagalloc_table_bytes",
                "Bytes used by the allocation table itself",
            )?,
            table_grows: gauge(&registry, "tagalloc_table_grows", "Table growth steps so far")?,
            table_shrinks: gauge(
                &registry,
                "tagalloc_table_shrinks",
                "Table shrink steps so far",
            )?,
            registry,
        })
    }

    pub fn observe(&self, stats: &TrackerStats) {
        self.live_allocations.set(clamp(stats.live_count));
        self.tracked_bytes.set(clamp(stats.total_size));
        self.table_entries.set(clamp(stats.table_size));
        self.table_bytes.set(clamp(stats.table_bytes));
        self.table_grows.set(clamp(stats.counters.grows));
        self.table_shrinks.set(clamp(stats.counters.shrinks));
    }

    /// Render every registered metric in the text exposition format.
    pub fn gather(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::<u8>::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagalloc_core::prelude::*;

    #[test]
    fn gauges_follow_tracker_stats() {
        let metrics = AllocationMetrics::new().unwrap();
        let tracker = TagTracker::new(&TrackerConfig::default()).unwrap();
        let a = tracker.allocate_array::<u8>(100, b"MTRC");
        let b = tracker.allocate_one::<u32>(b"MTRC");

        metrics.observe(&tracker.stats());
        assert_eq!(metrics.live_allocations.get(), 2);
        assert_eq!(metrics.tracked_bytes.get(), 104);
        assert_eq!(metrics.table_entries.get(), 64);

        drop(a);
        drop(b);
        metrics.observe(&tracker.stats());
        assert_eq!(metrics.live_allocations.get(), 0);
        assert_eq!(metrics.tracked_bytes.get(), 0);
    }

    #[test]
    fn exposition_names_every_gauge() {
        let metrics = AllocationMetrics::new().unwrap();
        let text = metrics.gather().unwrap();
        for name in [
            "tagalloc_live_allocations",
            "tagalloc_tracked_bytes",
            "tagalloc_table_entries",
            "tagalloc_table_bytes",
            "tagalloc_table_grows",
            "tagalloc_table_shrinks",
        ] {
            assert!(text.contains(name), "missing {name}");
        }
    }

    #[test]
    fn registering_twice_on_one_registry_fails() {
        let registry = Registry::new();
        AllocationMetrics::with_registry(registry.clone()).unwrap();
        assert!(matches!(
            AllocationMetrics::with_registry(registry),
            Err(MetricsError::Prometheus(_))
        ));
    }
}
