use cacheable::StoreService;
use common::model::keys::{avg_key, count_key, day_max_key, day_sum_key, resource_lock_key, sum_key};
use common::model::{ClassifiedHit, DayBucketing, UpdateKind, UpdateRequest};
use common::stats::PipelineStats;
use errors::StoreError;
use log::{debug, error, info};
use queue::recv_or_cancel;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use utils::date_utils::DateUtils;
use utils::decimal_utils::mean;

/// Applies update requests to the store, one at a time.
///
/// Avg updates maintain the daily sum, the lifetime sum, the lifetime count and the
/// lifetime mean. Max updates maintain the daily maximum. Every read-modify-write
/// runs under a per-resource lock so extra writers stay safe.
///
/// A failed avg update restores the keys it already wrote, so the lifetime mean
/// stays equal to the lifetime sum over the lifetime count.
#[derive(Clone)]
pub struct PersistenceWriter {
    store: StoreService,
    bucketing: DayBucketing,
    stats: Arc<PipelineStats>,
}

impl PersistenceWriter {
    pub fn new(store: StoreService, bucketing: DayBucketing, stats: Arc<PipelineStats>) -> Self {
        Self {
            store,
            bucketing,
            stats,
        }
    }

    pub async fn apply(&self, request: &UpdateRequest) -> Result<(), StoreError> {
        match request.kind {
            UpdateKind::Avg => self.apply_avg(&request.hit).await,
            UpdateKind::Max => self.apply_max(&request.hit).await,
        }
    }

    async fn apply_avg(&self, hit: &ClassifiedHit) -> Result<(), StoreError> {
        let (ty, id) = (hit.resource_type, hit.resource_id);
        let _guard = self.store.lock(&resource_lock_key(ty, id)).await;

        let mut undo = Undo::default();
        let result = self.write_avg(hit, &mut undo).await;
        if result.is_err() {
            self.rollback(undo).await;
        }
        result
    }

    async fn write_avg(&self, hit: &ClassifiedHit, undo: &mut Undo) -> Result<(), StoreError> {
        let (ty, id, rt) = (hit.resource_type, hit.resource_id, hit.response_time);
        let day_key = day_sum_key(&DateUtils::bucket_day(hit, self.bucketing), ty, id);
        let lifetime_key = sum_key(ty, id);
        let counter_key = count_key(ty, id);

        // totals are checked before anything is written
        let day_before = self.store.get_decimal(&day_key).await?;
        let sum_before = self.store.get_decimal(&lifetime_key).await?;
        let day_total = checked_total(&day_key, day_before, rt)?;
        let lifetime_sum = checked_total(&lifetime_key, sum_before, rt)?;

        self.store.set_decimal(&day_key, day_total).await?;
        undo.restore.push((day_key, day_before));
        self.store.set_decimal(&lifetime_key, lifetime_sum).await?;
        undo.restore.push((lifetime_key, sum_before));

        let count = self.store.incr(&counter_key, 1).await?;
        undo.counted = Some(counter_key);
        let avg = if count <= 1 {
            lifetime_sum
        } else {
            mean(lifetime_sum, count).ok_or_else(|| StoreError::Overflow {
                key: avg_key(ty, id),
            })?
        };
        self.store.set_decimal(&avg_key(ty, id), avg).await?;
        debug!("avg {ty}{id}: count={count} avg={avg}");
        Ok(())
    }

    async fn rollback(&self, undo: Undo) {
        if let Some(key) = &undo.counted {
            if let Err(e) = self.store.incr(key, -1).await {
                error!("rollback of {key} failed: {e}");
            }
        }
        for (key, before) in undo.restore.iter().rev() {
            if let Err(e) = self.store.set_decimal(key, before.unwrap_or_default()).await {
                error!("rollback of {key} failed: {e}");
            }
        }
    }

    async fn apply_max(&self, hit: &ClassifiedHit) -> Result<(), StoreError> {
        let (ty, id, rt) = (hit.resource_type, hit.resource_id, hit.response_time);
        let key = day_max_key(&DateUtils::bucket_day(hit, self.bucketing), ty, id);
        let _guard = self.store.lock(&key).await;

        if self.store.set_nx(&key, &rt.to_string()).await? {
            return Ok(());
        }
        match self.store.get_decimal(&key).await? {
            Some(current) if rt <= current => {}
            _ => {
                self.store.set_decimal(&key, rt).await?;
                debug!("new max for {key}: {rt}");
            }
        }
        Ok(())
    }

    /// Consumes the update queue until it is closed and empty, or `abort` fires.
    /// An update already being applied runs to completion. Store failures are
    /// logged and counted; the update is lost.
    pub async fn run(self, mut rx: Receiver<UpdateRequest>, abort: CancellationToken) -> u64 {
        info!("Persistence writer started");
        let mut applied = 0;
        while let Some(request) = recv_or_cancel(&mut rx, &abort).await {
            let kind = request.kind.as_str();
            match self.apply(&request).await {
                Ok(()) => {
                    applied += 1;
                    self.stats.record_update_applied(kind);
                }
                Err(e) => {
                    self.stats.record_store_failure(kind);
                    error!(
                        "{kind} update for {}{} lost: {e}",
                        request.hit.resource_type, request.hit.resource_id
                    );
                }
            }
        }
        info!("Persistence writer stopped after {applied} updates");
        applied
    }
}

/// Keys written by a partially applied avg update.
#[derive(Default)]
struct Undo {
    restore: Vec<(String, Option<Decimal>)>,
    counted: Option<String>,
}

fn checked_total(key: &str, before: Option<Decimal>, value: Decimal) -> Result<Decimal, StoreError> {
    before
        .unwrap_or_default()
        .checked_add(value)
        .ok_or_else(|| StoreError::Overflow { key: key.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cacheable::{LocalBackend, StoreBackend};
    use chrono::{Local, TimeZone};
    use common::model::ResourceType;
    use common::policy::RetryPolicy;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::mpsc::channel;

    /// Local store whose first `failures` INCR commands fail.
    struct FailingIncr {
        inner: LocalBackend,
        failures: AtomicU32,
    }

    #[async_trait::async_trait]
    impl StoreBackend for FailingIncr {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.inner.set(key, value).await
        }
        async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError> {
            self.inner.set_nx(key, value).await
        }
        async fn exists(&self, key: &str) -> Result<bool, StoreError> {
            self.inner.exists(key).await
        }
        async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
            let left = self.failures.load(Ordering::SeqCst);
            if delta > 0 && left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Pool("connection reset".to_string()));
            }
            self.inner.incr(key, delta).await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            self.inner.ping().await
        }
    }

    fn writer() -> (PersistenceWriter, Arc<LocalBackend>) {
        let backend = Arc::new(LocalBackend::new());
        let store = StoreService::with_backend(backend.clone(), RetryPolicy::no_retry());
        let writer = PersistenceWriter::new(store, DayBucketing::Event, Arc::new(PipelineStats::new()));
        (writer, backend)
    }

    fn request(kind: UpdateKind, ty: ResourceType, id: u64, rt: &str) -> UpdateRequest {
        let ingested = Local.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let hit = ClassifiedHit::new(
            ty,
            id,
            Decimal::from_str(rt).unwrap(),
            "2024-01-01 10:00:00",
            ingested,
        );
        UpdateRequest::new(kind, hit)
    }

    #[tokio::test]
    async fn avg_protocol_tracks_sum_count_and_mean() {
        let (writer, backend) = writer();
        writer
            .apply(&request(UpdateKind::Avg, ResourceType::Movie, 42, "10.5"))
            .await
            .unwrap();
        assert_eq!(backend.peek("sum_day_2024-01-01_movie42").as_deref(), Some("10.5"));
        assert_eq!(backend.peek("count_movie_42").as_deref(), Some("1"));
        assert_eq!(backend.peek("avg_movie_42").as_deref(), Some("10.5"));

        writer
            .apply(&request(UpdateKind::Avg, ResourceType::Movie, 42, "20.0"))
            .await
            .unwrap();
        assert_eq!(backend.peek("sum_day_2024-01-01_movie42").as_deref(), Some("30.5"));
        assert_eq!(backend.peek("sum_movie_42").as_deref(), Some("30.5"));
        assert_eq!(backend.peek("count_movie_42").as_deref(), Some("2"));
        assert_eq!(backend.peek("avg_movie_42").as_deref(), Some("15.25"));
    }

    #[tokio::test]
    async fn max_protocol_keeps_the_largest_value() {
        let (writer, backend) = writer();
        for rt in ["10.5", "20.0", "15"] {
            writer
                .apply(&request(UpdateKind::Max, ResourceType::Movie, 42, rt))
                .await
                .unwrap();
        }
        assert_eq!(backend.peek("max_day_2024-01-01_movie42").as_deref(), Some("20.0"));
        assert!(backend.peek("count_movie_42").is_none());
    }

    #[tokio::test]
    async fn lifetime_mean_spans_days() {
        let (writer, backend) = writer();
        writer
            .apply(&request(UpdateKind::Avg, ResourceType::List, 3, "1"))
            .await
            .unwrap();
        let mut next_day = request(UpdateKind::Avg, ResourceType::List, 3, "2");
        next_day.hit.client_timestamp = "2024-01-02 10:00:00".to_string();
        writer.apply(&next_day).await.unwrap();

        assert_eq!(backend.peek("sum_day_2024-01-01_list3").as_deref(), Some("1"));
        assert_eq!(backend.peek("sum_day_2024-01-02_list3").as_deref(), Some("2"));
        assert_eq!(backend.peek("count_list_3").as_deref(), Some("2"));
        assert_eq!(backend.peek("avg_list_3").as_deref(), Some("1.5"));
    }

    #[tokio::test]
    async fn failed_count_rolls_back_the_sums() {
        let backend = Arc::new(FailingIncr {
            inner: LocalBackend::new(),
            failures: AtomicU32::new(1),
        });
        let store = StoreService::with_backend(backend.clone(), RetryPolicy::no_retry());
        let writer = PersistenceWriter::new(store, DayBucketing::Event, Arc::new(PipelineStats::new()));

        let err = writer
            .apply(&request(UpdateKind::Avg, ResourceType::Movie, 42, "10"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Pool(_)));
        assert_eq!(backend.inner.peek("sum_movie_42").as_deref(), Some("0"));
        assert!(backend.inner.peek("count_movie_42").is_none());

        for rt in ["20", "30"] {
            writer
                .apply(&request(UpdateKind::Avg, ResourceType::Movie, 42, rt))
                .await
                .unwrap();
        }
        assert_eq!(backend.inner.peek("sum_movie_42").as_deref(), Some("50"));
        assert_eq!(backend.inner.peek("sum_day_2024-01-01_movie42").as_deref(), Some("50"));
        assert_eq!(backend.inner.peek("count_movie_42").as_deref(), Some("2"));
        assert_eq!(backend.inner.peek("avg_movie_42").as_deref(), Some("25"));
    }

    #[tokio::test]
    async fn sum_overflow_is_a_store_failure() {
        let (writer, backend) = writer();
        let huge = Decimal::MAX.to_string();
        writer
            .apply(&request(UpdateKind::Avg, ResourceType::Movie, 42, &huge))
            .await
            .unwrap();

        let stats = writer.stats.clone();
        let (tx, rx) = channel(4);
        tx.send(request(UpdateKind::Avg, ResourceType::Movie, 42, &huge)).await.unwrap();
        tx.send(request(UpdateKind::Max, ResourceType::Movie, 42, &huge)).await.unwrap();
        drop(tx);

        let applied = writer.run(rx, CancellationToken::new()).await;
        assert_eq!(applied, 1);
        assert_eq!(stats.snapshot().store_failures, 1);
        assert_eq!(backend.peek("count_movie_42").as_deref(), Some("1"));
        assert_eq!(backend.peek("sum_movie_42"), Some(huge.clone()));
        assert_eq!(backend.peek("avg_movie_42"), Some(huge));
    }

    #[tokio::test]
    async fn store_failures_are_counted_and_skipped() {
        let (writer, backend) = writer();
        backend
            .set("max_day_2024-01-01_home1", "garbage")
            .await
            .unwrap();
        let stats = writer.stats.clone();

        let (tx, rx) = channel(4);
        tx.send(request(UpdateKind::Max, ResourceType::Home, 1, "1.0")).await.unwrap();
        tx.send(request(UpdateKind::Avg, ResourceType::Home, 1, "1.0")).await.unwrap();
        drop(tx);

        let applied = writer.run(rx, CancellationToken::new()).await;
        assert_eq!(applied, 1);
        let snap = stats.snapshot();
        assert_eq!(snap.store_failures, 1);
        assert_eq!(snap.updates_applied, 1);
        assert_eq!(backend.peek("avg_home_1").as_deref(), Some("1.0"));
    }
}
