use common::stats::PipelineStats;
use log::{debug, info};
use metrics::gauge;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Periodically logs the pipeline counters.
pub struct StatsMonitor {
    stats: Arc<PipelineStats>,
    interval: Duration,
}

impl StatsMonitor {
    pub fn new(stats: Arc<PipelineStats>, interval_secs: u64) -> Self {
        Self {
            stats,
            interval: Duration::from_secs(interval_secs.max(1)),
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!("StatsMonitor started with interval {:?}", self.interval);
        let mut last_lines = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("StatsMonitor received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {
                    let snap = self.stats.snapshot();
                    let rate = (snap.lines_read - last_lines) as f64 / self.interval.as_secs_f64();
                    last_lines = snap.lines_read;
                    gauge!("beaconflow_lines_per_second").set(rate);
                    info!(
                        "pipeline: read={} dropped={} parse_errors={} read_errors={} classified={} applied={} store_failures={} ({rate:.1} lines/s)",
                        snap.lines_read,
                        snap.lines_dropped,
                        snap.parse_errors,
                        snap.read_errors,
                        snap.hits_classified,
                        snap.updates_applied,
                        snap.store_failures,
                    );
                }
            }
        }
    }
}
