use common::model::{RawLine, TailConfig};
use common::stats::PipelineStats;
use errors::{QueueError, TailError};
use log::{debug, info, warn};
use queue::send_with_backpressure;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

/// Longest line the tailer holds. Longer lines are dropped whole.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Follows the access log and feeds complete lines into the raw queue.
///
/// The file is read from the start. At end of file the tailer sleeps for the poll
/// interval and tries again, so it only returns on shutdown or on a fatal error.
pub struct Tailer {
    path: PathBuf,
    poll_interval: Duration,
    max_read_errors: u32,
    stats: Arc<PipelineStats>,
}

impl Tailer {
    pub fn new(config: &TailConfig, stats: Arc<PipelineStats>) -> Self {
        Self {
            path: config.log_file_path.clone(),
            poll_interval: config.poll_interval(),
            max_read_errors: config.max_read_errors.max(1),
            stats,
        }
    }

    async fn open(&self) -> Result<File, TailError> {
        File::open(&self.path)
            .await
            .map_err(|source| TailError::OpenFailed {
                path: self.path.display().to_string(),
                source,
            })
    }

    /// Runs until `shutdown` fires. Sends wait on `abort`, so lines read before
    /// shutdown still reach the pipeline during the drain.
    ///
    /// Returns the number of lines emitted.
    pub async fn run(
        self,
        tx: Sender<RawLine>,
        shutdown: CancellationToken,
        abort: CancellationToken,
    ) -> Result<u64, TailError> {
        let file = self.open().await?;
        info!("Tailing {}", self.path.display());

        let mut reader = BufReader::new(file);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);
        let mut seq: u64 = 0;
        let mut read_errors: u32 = 0;
        // set while the rest of an oversized line is being discarded
        let mut skipping = false;

        loop {
            let read = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                read = reader.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => {
                    read_errors = 0;
                    debug!("end of {} after {seq} lines, waiting", self.path.display());
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Ok(_) => {
                    read_errors = 0;
                    let complete = buf.last() == Some(&b'\n');
                    if skipping || buf.len() > MAX_LINE_BYTES {
                        if !skipping {
                            warn!("dropping line {seq}: longer than {MAX_LINE_BYTES} bytes");
                            self.stats.record_line_dropped();
                        }
                        buf.clear();
                        skipping = !complete;
                        continue;
                    }
                    // an unterminated tail stays in `buf` until the writer finishes the line
                    if !complete {
                        continue;
                    }
                    let line = take_line(&mut buf);
                    if !self.emit(&tx, seq, line, &abort).await {
                        return Ok(seq);
                    }
                    seq += 1;
                }
                Err(e) => {
                    read_errors += 1;
                    self.stats.record_read_error();
                    warn!(
                        "read error on {} ({read_errors}/{}): {e}",
                        self.path.display(),
                        self.max_read_errors
                    );
                    if read_errors >= self.max_read_errors {
                        return Err(TailError::TooManyReadErrors {
                            count: read_errors,
                            source: e,
                        });
                    }
                    tokio::task::yield_now().await;
                }
            }
        }

        if !buf.is_empty() && !skipping {
            let line = take_line(&mut buf);
            debug!("flushing unterminated last line");
            if self.emit(&tx, seq, line, &abort).await {
                seq += 1;
            }
        }
        info!("Tailer stopped after {seq} lines");
        Ok(seq)
    }

    /// `false` once the pipeline can no longer take lines.
    async fn emit(
        &self,
        tx: &Sender<RawLine>,
        seq: u64,
        text: String,
        abort: &CancellationToken,
    ) -> bool {
        if text.is_empty() {
            return true;
        }
        self.stats.record_line_read();
        match send_with_backpressure(tx, RawLine::new(seq, text), abort, "raw").await {
            Ok(_) => true,
            Err(QueueError::Cancelled(_)) => false,
            Err(e) => {
                warn!("tailer stopping: {e}");
                false
            }
        }
    }
}

/// Drains `buf` into a line without its terminator.
fn take_line(buf: &mut Vec<u8>) -> String {
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    line
}
