use chrono::{DateTime, Local};
use common::model::{Beacon, ClassifiedHit, RawLine, ResourceType};
use common::stats::PipelineStats;
use errors::{ParseError, PipelineError, QueueError};
use futures::future::join_all;
use log::{debug, error, info, trace};
use queue::{recv_shared, send_with_backpressure};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio_util::sync::CancellationToken;
use url::Url;
use utils::decimal_utils::parse_decimal;

pub const TRACKING_MARKER: &str = "/dig?";
pub const PROTOCOL_MARKER: &str = "HTTP/";
pub const RESPONSE_TIME_DELIMITER: char = '`';

const MOVIE_MARKER: &str = "/movie/";
const LIST_MARKER: &str = "/list/";
const PAGE_SUFFIX: &str = ".html";

/// Pulls the beacon out of an access-log line.
///
/// The query runs from the tracking marker to the protocol marker, or to the end
/// of the line when the request line was cut short.
pub fn extract_beacon(line: &str) -> Result<Beacon, ParseError> {
    let line = line.trim();
    let start = line
        .find(TRACKING_MARKER)
        .map(|pos| pos + TRACKING_MARKER.len())
        .ok_or(ParseError::MissingMarker)?;
    let rest = &line[start..];
    let query = match rest.find(PROTOCOL_MARKER) {
        Some(end) => &rest[..end],
        None => rest,
    };

    let parsed = Url::parse(&format!("http://localhost/?{}", query.trim()))
        .map_err(|_| ParseError::MissingUrl)?;
    let mut url = None;
    let mut time = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "url" if url.is_none() => url = Some(value.into_owned()),
            "time" if time.is_none() => time = Some(value.into_owned()),
            _ => {}
        }
    }
    let url = url.filter(|u| !u.is_empty()).ok_or(ParseError::MissingUrl)?;

    Ok(Beacon {
        url,
        response_time: response_time(line)?,
        client_timestamp: time.unwrap_or_default(),
    })
}

fn response_time(line: &str) -> Result<rust_decimal::Decimal, ParseError> {
    let mut fields = line.split(RESPONSE_TIME_DELIMITER);
    fields.next();
    let raw = match (fields.next(), fields.next()) {
        (Some(raw), Some(_)) => raw,
        _ => return Err(ParseError::MissingResponseTime),
    };
    parse_decimal(raw).ok_or_else(|| ParseError::InvalidResponseTime(raw.to_string()))
}

/// Maps the beacon's page url to a resource.
pub fn classify(beacon: &Beacon, ingested_at: DateTime<Local>) -> Result<ClassifiedHit, ParseError> {
    let (resource_type, resource_id) = if let Some(id) = resource_id(&beacon.url, MOVIE_MARKER)? {
        (ResourceType::Movie, id)
    } else if let Some(id) = resource_id(&beacon.url, LIST_MARKER)? {
        (ResourceType::List, id)
    } else {
        (ResourceType::Home, 0)
    };
    Ok(ClassifiedHit::new(
        resource_type,
        resource_id,
        beacon.response_time,
        beacon.client_timestamp.clone(),
        ingested_at,
    ))
}

/// `Ok(None)` when `marker` is not in the url. Zero is rejected because the key
/// scheme reads it as a missing id.
fn resource_id(url: &str, marker: &str) -> Result<Option<u64>, ParseError> {
    let Some(pos) = url.find(marker) else {
        return Ok(None);
    };
    let tail = &url[pos + marker.len()..];
    let raw = match tail.find(PAGE_SUFFIX) {
        Some(end) => &tail[..end],
        None => return Err(ParseError::InvalidResourceId(tail.to_string())),
    };
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidResourceId(raw.to_string()));
    }
    match raw.parse::<u64>() {
        Ok(id) if id > 0 => Ok(Some(id)),
        _ => Err(ParseError::InvalidResourceId(raw.to_string())),
    }
}

pub fn classify_line(line: &str, ingested_at: DateTime<Local>) -> Result<ClassifiedHit, ParseError> {
    let beacon = extract_beacon(line)?;
    classify(&beacon, ingested_at)
}

/// N workers sharing the raw queue. Every hit goes to both the max and the avg queue.
pub struct ClassifierPool {
    workers: usize,
    stats: Arc<PipelineStats>,
}

impl ClassifierPool {
    pub fn new(workers: usize, stats: Arc<PipelineStats>) -> Self {
        Self {
            workers: workers.max(1),
            stats,
        }
    }

    /// Returns once every worker has stopped. The output queues close when the
    /// last worker drops its senders.
    pub async fn run(
        self,
        rx: Arc<Mutex<Receiver<RawLine>>>,
        max_tx: Sender<ClassifiedHit>,
        avg_tx: Sender<ClassifiedHit>,
        abort: CancellationToken,
    ) -> errors::Result<u64> {
        info!("Starting classifier pool with {} workers", self.workers);
        let handles: Vec<_> = (0..self.workers)
            .map(|id| {
                tokio::spawn(classify_worker(
                    id,
                    rx.clone(),
                    max_tx.clone(),
                    avg_tx.clone(),
                    self.stats.clone(),
                    abort.clone(),
                ))
            })
            .collect();
        drop(max_tx);
        drop(avg_tx);

        let mut classified = 0;
        let mut failure: Option<errors::Error> = None;
        for (id, joined) in join_all(handles).await.into_iter().enumerate() {
            match joined {
                Ok(Ok(n)) => classified += n,
                Ok(Err(e)) => {
                    error!("classifier worker {id} failed: {e}");
                    failure.get_or_insert(e.into());
                }
                Err(e) => {
                    error!("classifier worker {id} panicked: {e}");
                    abort.cancel();
                    failure.get_or_insert(PipelineError::StagePanicked { stage: "classifier" }.into());
                }
            }
        }
        info!("Classifier pool stopped after {classified} hits");
        match failure {
            Some(e) => Err(e),
            None => Ok(classified),
        }
    }
}

async fn classify_worker(
    id: usize,
    rx: Arc<Mutex<Receiver<RawLine>>>,
    max_tx: Sender<ClassifiedHit>,
    avg_tx: Sender<ClassifiedHit>,
    stats: Arc<PipelineStats>,
    abort: CancellationToken,
) -> Result<u64, QueueError> {
    let mut classified = 0;
    while let Some(line) = recv_shared(&rx, &abort).await {
        let hit = match classify_line(&line.text, Local::now()) {
            Ok(hit) => hit,
            Err(ParseError::MissingMarker) => {
                stats.record_line_dropped();
                trace!("worker {id}: line {} has no beacon", line.seq);
                continue;
            }
            Err(e) => {
                stats.record_parse_error();
                debug!("worker {id}: line {} rejected: {e}", line.seq);
                continue;
            }
        };
        stats.record_hit_classified();

        let sent = match send_with_backpressure(&max_tx, hit.clone(), &abort, "max").await {
            Ok(_) => send_with_backpressure(&avg_tx, hit, &abort, "avg").await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(_) => classified += 1,
            Err(QueueError::Cancelled(_)) => break,
            Err(e) => return Err(e),
        }
    }
    debug!("classifier worker {id} exiting");
    Ok(classified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use tokio::sync::mpsc::channel;

    const MOVIE_LINE: &str = "127.0.0.1 - - [01/Jan/2024:10:00:00 +0800] `10.5` \"GET /dig?time=2024-01-01%2010%3A00%3A00&url=http%3A%2F%2Flocalhost%2Fmovie%2F42.html HTTP/1.1\" 200 43 \"-\" \"Mozilla/5.0\"";

    fn line_for(url: &str, rt: &str) -> String {
        format!(
            "127.0.0.1 - - [01/Jan/2024:10:00:00 +0800] `{rt}` \"GET /dig?time=1704074400&url={url} HTTP/1.1\" 200 43"
        )
    }

    #[test]
    fn extracts_beacon_fields() {
        let beacon = extract_beacon(MOVIE_LINE).unwrap();
        assert_eq!(beacon.url, "http://localhost/movie/42.html");
        assert_eq!(beacon.client_timestamp, "2024-01-01 10:00:00");
        assert_eq!(beacon.response_time, Decimal::from_str("10.5").unwrap());
    }

    #[test]
    fn line_without_marker_is_dropped() {
        let err = extract_beacon("GET /index.html HTTP/1.1 `0.1`").unwrap_err();
        assert!(matches!(err, ParseError::MissingMarker));
    }

    #[test]
    fn query_without_protocol_marker_runs_to_end() {
        let beacon = extract_beacon("`1.0` GET /dig?url=%2Flist%2F7.html&time=x").unwrap();
        assert_eq!(beacon.url, "/list/7.html");
        assert_eq!(beacon.client_timestamp, "x");
    }

    #[test]
    fn bad_response_time_is_rejected() {
        let err = extract_beacon(&line_for("%2Fmovie%2F1.html", "slow")).unwrap_err();
        assert!(matches!(err, ParseError::InvalidResponseTime(ref v) if v == "slow"));

        let err = extract_beacon("GET /dig?url=%2F HTTP/1.1").unwrap_err();
        assert!(matches!(err, ParseError::MissingResponseTime));
    }

    #[test]
    fn missing_url_is_rejected() {
        let err = extract_beacon("`1.0` GET /dig?time=1 HTTP/1.1").unwrap_err();
        assert!(matches!(err, ParseError::MissingUrl));
    }

    #[test]
    fn classifies_movie_list_and_home() {
        let now = Local::now();
        let hit = classify_line(&line_for("%2Fmovie%2F42.html", "10.5"), now).unwrap();
        assert_eq!((hit.resource_type, hit.resource_id), (ResourceType::Movie, 42));

        let hit = classify_line(&line_for("http%3A%2F%2Fsite%2Flist%2F3.html", "1"), now).unwrap();
        assert_eq!((hit.resource_type, hit.resource_id), (ResourceType::List, 3));

        let hit = classify_line(&line_for("http%3A%2F%2Fsite%2F", "1"), now).unwrap();
        assert_eq!((hit.resource_type, hit.resource_id), (ResourceType::Home, 1));
        assert_eq!(hit.ingested_at, now);
    }

    #[test]
    fn non_numeric_or_zero_id_is_rejected() {
        let now = Local::now();
        let err = classify_line(&line_for("%2Fmovie%2Fabc.html", "1"), now).unwrap_err();
        assert!(matches!(err, ParseError::InvalidResourceId(ref v) if v == "abc"));

        let err = classify_line(&line_for("%2Flist%2F0.html", "1"), now).unwrap_err();
        assert!(matches!(err, ParseError::InvalidResourceId(_)));

        let err = classify_line(&line_for("%2Fmovie%2F42", "1"), now).unwrap_err();
        assert!(matches!(err, ParseError::InvalidResourceId(_)));
    }

    #[test]
    fn signed_id_is_rejected() {
        let now = Local::now();
        let err = classify_line(&line_for("%2Fmovie%2F%2B42.html", "1"), now).unwrap_err();
        assert!(matches!(err, ParseError::InvalidResourceId(ref v) if v == "+42"));

        let err = classify_line(&line_for("%2Flist%2F-3.html", "1"), now).unwrap_err();
        assert!(matches!(err, ParseError::InvalidResourceId(ref v) if v == "-3"));
    }

    #[tokio::test]
    async fn pool_fans_out_to_both_queues() {
        let stats = Arc::new(PipelineStats::new());
        let (raw_tx, raw_rx) = channel(8);
        let (max_tx, mut max_rx) = channel(8);
        let (avg_tx, mut avg_rx) = channel(8);
        let abort = CancellationToken::new();

        raw_tx.send(RawLine::new(0, MOVIE_LINE)).await.unwrap();
        raw_tx.send(RawLine::new(1, "no beacon here")).await.unwrap();
        raw_tx.send(RawLine::new(2, line_for("%2Fmovie%2Fx.html", "1"))).await.unwrap();
        drop(raw_tx);

        let pool = ClassifierPool::new(3, stats.clone());
        let raw_rx = Arc::new(Mutex::new(raw_rx));
        let classified = pool.run(raw_rx, max_tx, avg_tx, abort).await.unwrap();
        assert_eq!(classified, 1);

        assert_eq!(max_rx.recv().await.map(|h| h.resource_id), Some(42));
        assert_eq!(avg_rx.recv().await.map(|h| h.resource_id), Some(42));
        assert!(max_rx.recv().await.is_none());
        assert!(avg_rx.recv().await.is_none());

        let snap = stats.snapshot();
        assert_eq!(snap.hits_classified, 1);
        assert_eq!(snap.lines_dropped, 1);
        assert_eq!(snap.parse_errors, 1);
    }
}
