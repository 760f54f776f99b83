use metrics::counter;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide pipeline counters.
///
/// Each increment is also forwarded to the `metrics` facade so an exporter
/// installed by the host process picks them up.
#[derive(Debug, Default)]
pub struct PipelineStats {
    lines_read: AtomicU64,
    lines_dropped: AtomicU64,
    parse_errors: AtomicU64,
    read_errors: AtomicU64,
    hits_classified: AtomicU64,
    updates_applied: AtomicU64,
    store_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub lines_read: u64,
    pub lines_dropped: u64,
    pub parse_errors: u64,
    pub read_errors: u64,
    pub hits_classified: u64,
    pub updates_applied: u64,
    pub store_failures: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_line_read(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
        counter!("beaconflow_lines_read_total").increment(1);
    }

    /// Line without a tracking marker.
    pub fn record_line_dropped(&self) {
        self.lines_dropped.fetch_add(1, Ordering::Relaxed);
        counter!("beaconflow_lines_dropped_total").increment(1);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
        counter!("beaconflow_parse_errors_total").increment(1);
    }

    pub fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
        counter!("beaconflow_read_errors_total").increment(1);
    }

    pub fn record_hit_classified(&self) {
        self.hits_classified.fetch_add(1, Ordering::Relaxed);
        counter!("beaconflow_hits_classified_total").increment(1);
    }

    pub fn record_update_applied(&self, kind: &'static str) {
        self.updates_applied.fetch_add(1, Ordering::Relaxed);
        counter!("beaconflow_updates_applied_total", "kind" => kind).increment(1);
    }

    pub fn record_store_failure(&self, kind: &'static str) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
        counter!("beaconflow_store_failures_total", "kind" => kind).increment(1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            lines_dropped: self.lines_dropped.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            hits_classified: self.hits_classified.load(Ordering::Relaxed),
            updates_applied: self.updates_applied.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let stats = PipelineStats::new();
        stats.record_line_read();
        stats.record_line_read();
        stats.record_line_dropped();
        stats.record_update_applied("max");
        stats.record_store_failure("avg");

        let snap = stats.snapshot();
        assert_eq!(snap.lines_read, 2);
        assert_eq!(snap.lines_dropped, 1);
        assert_eq!(snap.updates_applied, 1);
        assert_eq!(snap.store_failures, 1);
        assert_eq!(snap.parse_errors, 0);
    }
}
