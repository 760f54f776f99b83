use errors::QueueError;
use metrics::counter;
use tokio::sync::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressureSendState {
    Direct,
    /// The queue was full and the producer waited for room.
    RecoveredFromFull,
}

/// Sends `item`, parking the producer while the queue is full.
///
/// Waiting ends early when `cancel` fires; the item is dropped in that case.
pub async fn send_with_backpressure<T>(
    tx: &Sender<T>,
    item: T,
    cancel: &CancellationToken,
    queue: &'static str,
) -> Result<BackpressureSendState, QueueError> {
    match tx.try_send(item) {
        Ok(()) => Ok(BackpressureSendState::Direct),
        Err(TrySendError::Full(item)) => {
            counter!("beaconflow_queue_full_total", "queue" => queue).increment(1);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(QueueError::Cancelled(queue)),
                res = tx.send(item) => match res {
                    Ok(()) => Ok(BackpressureSendState::RecoveredFromFull),
                    Err(_) => Err(QueueError::Closed(queue)),
                },
            }
        }
        Err(TrySendError::Closed(_)) => Err(QueueError::Closed(queue)),
    }
}

/// Next item, or `None` once the queue is closed and empty or `cancel` fires.
pub async fn recv_or_cancel<T>(rx: &mut Receiver<T>, cancel: &CancellationToken) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        item = rx.recv() => item,
    }
}

/// [`recv_or_cancel`] for a receiver shared by several workers.
///
/// The lock is only held while waiting for one item.
pub async fn recv_shared<T>(rx: &Mutex<Receiver<T>>, cancel: &CancellationToken) -> Option<T> {
    let mut guard = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        guard = rx.lock() => guard,
    };
    recv_or_cancel(&mut guard, cancel).await
}
