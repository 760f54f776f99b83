use common::model::{ClassifiedHit, UpdateKind, UpdateRequest};
use errors::QueueError;
use log::{debug, info};
use queue::{recv_or_cancel, send_with_backpressure};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio_util::sync::CancellationToken;

/// Stateless stage that tags every hit with one update kind and forwards it to
/// the writer. One instance runs per kind.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    kind: UpdateKind,
}

impl Aggregator {
    pub fn new(kind: UpdateKind) -> Self {
        Self { kind }
    }

    pub fn max() -> Self {
        Self::new(UpdateKind::Max)
    }

    pub fn avg() -> Self {
        Self::new(UpdateKind::Avg)
    }

    pub fn tag(&self, hit: ClassifiedHit) -> UpdateRequest {
        UpdateRequest::new(self.kind, hit)
    }

    /// Runs until the input queue is drained and closed, or `abort` fires.
    pub async fn run(
        self,
        mut rx: Receiver<ClassifiedHit>,
        tx: Sender<UpdateRequest>,
        abort: CancellationToken,
    ) -> Result<u64, QueueError> {
        info!("{} aggregator started", self.kind);
        let mut forwarded = 0;
        while let Some(hit) = recv_or_cancel(&mut rx, &abort).await {
            match send_with_backpressure(&tx, self.tag(hit), &abort, "update").await {
                Ok(_) => forwarded += 1,
                Err(QueueError::Cancelled(_)) => break,
                Err(e) => return Err(e),
            }
        }
        debug!("{} aggregator forwarded {forwarded} hits", self.kind);
        Ok(forwarded)
    }
}
