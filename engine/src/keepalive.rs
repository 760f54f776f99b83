use cacheable::StoreService;
use log::{debug, info, warn};
use metrics::counter;
use std::time::Duration;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;

/// Pings the store on a fixed interval so idle pooled connections are not dropped
/// by the server. Failures are logged and counted only.
pub async fn run_keepalive(store: StoreService, period: Duration, cancel: CancellationToken) {
    info!("Store keep-alive started with interval {period:?}");
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("keep-alive received shutdown signal");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = store.ping().await {
                    counter!("beaconflow_keepalive_failures_total").increment(1);
                    warn!("store keep-alive ping failed: {e}");
                }
            }
        }
    }
}
