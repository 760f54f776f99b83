use crate::aggregator::Aggregator;
use crate::classifier::ClassifierPool;
use crate::keepalive::run_keepalive;
use crate::monitor::StatsMonitor;
use crate::tailer::Tailer;
use crate::writer::PersistenceWriter;
use cacheable::StoreService;
use common::model::Config;
use common::stats::{PipelineStats, StatsSnapshot};
use errors::PipelineError;
use futures::FutureExt;
use log::{debug, error, info, warn};
use queue::Channel;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;


/// Grace period for stages to notice an abort before they are killed.
const ABORT_GRACE: Duration = Duration::from_secs(1);

/// First fatal error reported by any stage.
#[derive(Clone, Default)]
struct FatalSlot(Arc<Mutex<Option<errors::Error>>>);

impl FatalSlot {
    fn set(&self, err: errors::Error) {
        if let Ok(mut slot) = self.0.lock() {
            if slot.is_none() {
                *slot = Some(err);
            }
        }
    }

    fn take(&self) -> Option<errors::Error> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Owns the pipeline lifecycle.
///
/// Two tokens control shutdown. `shutdown` stops the tailer; the queues then
/// close one after another and downstream stages drain what is in flight.
/// `abort` stops everything at once. It fires on a fatal stage error, a second
/// Ctrl-C, or when the drain exceeds `drain_timeout_secs`. `shutdown` is a
/// child of `abort`.
pub struct Engine {
    config: Config,
    store: StoreService,
    stats: Arc<PipelineStats>,
    abort: CancellationToken,
    shutdown: CancellationToken,
    handle_signals: bool,
}

impl Engine {
    pub fn new(config: Config, store: StoreService) -> Self {
        let abort = CancellationToken::new();
        let shutdown = abort.child_token();
        Self {
            config,
            store,
            stats: Arc::new(PipelineStats::new()),
            abort,
            shutdown,
            handle_signals: true,
        }
    }

    /// Leaves Ctrl-C alone; the caller drives shutdown through the tokens.
    pub fn without_signal_handler(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Runs the pipeline until shutdown and returns the final counters.
    ///
    /// Fails when the store does not answer the startup PING, or with the first
    /// fatal stage error.
    pub async fn run(self) -> errors::Result<StatsSnapshot> {
        if let Err(e) = self.store.ping().await {
            error!("Store unreachable at startup: {e}");
            return Err(e.into());
        }
        let pipeline = &self.config.pipeline;
        info!(
            "Starting pipeline: {} workers, {:?} day bucketing",
            pipeline.workers, pipeline.day_bucketing
        );

        let fatal = FatalSlot::default();
        let Channel {
            raw_sender,
            raw_receiver,
            max_sender,
            max_receiver,
            avg_sender,
            avg_receiver,
            update_sender,
            update_receiver,
        } = Channel::new(pipeline);

        let mut background = JoinSet::new();
        background.spawn(run_keepalive(
            self.store.clone(),
            self.config.store.keepalive_interval(),
            self.abort.clone(),
        ));
        if pipeline.stats_interval_secs > 0 {
            let monitor = StatsMonitor::new(self.stats.clone(), pipeline.stats_interval_secs);
            background.spawn(monitor.run(self.abort.clone()));
        }
        if self.handle_signals {
            background.spawn(watch_signals(self.shutdown.clone(), self.abort.clone()));
        }

        let tailer = Tailer::new(&self.config.tail, self.stats.clone());
        let tail_handle = tokio::spawn(supervise(
            "tailer",
            self.abort.clone(),
            fatal.clone(),
            tailer.run(raw_sender, self.shutdown.clone(), self.abort.clone()),
        ));

        let mut stages = JoinSet::new();
        let pool = ClassifierPool::new(pipeline.workers, self.stats.clone());
        stages.spawn(supervise(
            "classifier",
            self.abort.clone(),
            fatal.clone(),
            pool.run(raw_receiver, max_sender, avg_sender, self.abort.clone()),
        ));
        stages.spawn(supervise(
            "max",
            self.abort.clone(),
            fatal.clone(),
            Aggregator::max().run(max_receiver, update_sender.clone(), self.abort.clone()),
        ));
        stages.spawn(supervise(
            "avg",
            self.abort.clone(),
            fatal.clone(),
            Aggregator::avg().run(avg_receiver, update_sender, self.abort.clone()),
        ));
        let writer = PersistenceWriter::new(
            self.store.clone(),
            pipeline.day_bucketing,
            self.stats.clone(),
        );
        let writer_abort = self.abort.clone();
        stages.spawn(supervise(
            "writer",
            self.abort.clone(),
            fatal.clone(),
            async move { Ok::<_, errors::Error>(writer.run(update_receiver, writer_abort).await) },
        ));

        if let Err(e) = tail_handle.await {
            error!("tailer task failed: {e}");
            self.abort.cancel();
        }
        if self.abort.is_cancelled() {
            warn!("Pipeline aborted, stopping stages");
        } else {
            info!("Tailer stopped, draining in-flight items");
        }

        let drain_timeout = pipeline.drain_timeout();
        if tokio::time::timeout(drain_timeout, join_stages(&mut stages))
            .await
            .is_err()
        {
            warn!("{}", PipelineError::DrainTimeout(drain_timeout.as_secs()));
            self.abort.cancel();
            if tokio::time::timeout(ABORT_GRACE, join_stages(&mut stages))
                .await
                .is_err()
            {
                stages.abort_all();
            }
        }

        self.abort.cancel();
        while background.join_next().await.is_some() {}

        let snapshot = self.stats.snapshot();
        info!("Pipeline stopped: {snapshot:?}");
        match fatal.take() {
            Some(err) => Err(err),
            None => Ok(snapshot),
        }
    }
}

/// Runs one stage. A failure or panic is recorded and aborts the whole pipeline.
async fn supervise<T, E, F>(stage: &'static str, abort: CancellationToken, fatal: FatalSlot, fut: F)
where
    F: Future<Output = Result<T, E>>,
    E: Into<errors::Error> + Display,
{
    let span = tracing::info_span!("stage", name = stage);
    let err: errors::Error = match AssertUnwindSafe(fut.instrument(span)).catch_unwind().await {
        Ok(Ok(_)) => {
            debug!("{stage} stage finished");
            return;
        }
        Ok(Err(e)) => {
            error!("{stage} stage failed: {e}");
            e.into()
        }
        Err(_) => {
            error!("{stage} stage panicked");
            PipelineError::StagePanicked { stage }.into()
        }
    };
    fatal.set(err);
    abort.cancel();
}

async fn join_stages(stages: &mut JoinSet<()>) {
    while let Some(joined) = stages.join_next().await {
        if let Err(e) = joined {
            error!("stage task failed: {e}");
        }
    }
}

/// First Ctrl-C starts a graceful shutdown, the second aborts.
async fn watch_signals(shutdown: CancellationToken, abort: CancellationToken) {
    loop {
        tokio::select! {
            _ = abort.cancelled() => break,
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!("cannot listen for Ctrl+C: {e}");
                    break;
                }
                if shutdown.is_cancelled() {
                    warn!("Received second Ctrl+C, aborting");
                    abort.cancel();
                    break;
                }
                info!("Received Ctrl+C, initiating shutdown...");
                shutdown.cancel();
            }
        }
    }
}
