use common::model::config::PipelineConfig;
use common::model::{ClassifiedHit, RawLine, UpdateRequest};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{Receiver, Sender, channel};

/// Bounded queues between the pipeline stages.
///
/// Data flow:
/// 1. Raw: tailer -> classifier pool (shared by every classifier worker)
/// 2. Max: classifier pool -> max aggregator
/// 3. Avg: classifier pool -> avg aggregator
/// 4. Update: both aggregators -> persistence writer
///
/// The struct is meant to be taken apart by the engine: each end moves into the
/// stage that owns it so a queue closes once all of its producers have exited.
pub struct Channel {
    pub raw_sender: Sender<RawLine>,
    pub raw_receiver: Arc<Mutex<Receiver<RawLine>>>,

    pub max_sender: Sender<ClassifiedHit>,
    pub max_receiver: Receiver<ClassifiedHit>,

    pub avg_sender: Sender<ClassifiedHit>,
    pub avg_receiver: Receiver<ClassifiedHit>,

    pub update_sender: Sender<UpdateRequest>,
    pub update_receiver: Receiver<UpdateRequest>,
}

impl Channel {
    /// Capacities follow the worker count: raw 3N, classified N each, update N.
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_capacities(
            config.raw_capacity(),
            config.classified_capacity(),
            config.update_capacity(),
        )
    }

    pub fn with_capacities(raw: usize, classified: usize, update: usize) -> Self {
        let (raw_sender, raw_receiver) = channel(raw.max(1));
        let (max_sender, max_receiver) = channel(classified.max(1));
        let (avg_sender, avg_receiver) = channel(classified.max(1));
        let (update_sender, update_receiver) = channel(update.max(1));

        Channel {
            raw_sender,
            raw_receiver: Arc::new(Mutex::new(raw_receiver)),
            max_sender,
            max_receiver,
            avg_sender,
            avg_receiver,
            update_sender,
            update_receiver,
        }
    }
}
