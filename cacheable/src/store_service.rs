pub mod backend;
pub mod key_lock;
pub mod local_backend;
pub mod redis_backend;

use backend::StoreBackend;
use common::policy::RetryPolicy;
use deadpool_redis::Pool;
use errors::StoreError;
use key_lock::{KeyGuard, KeyLocks};
use local_backend::LocalBackend;
use log::{debug, warn};
use metrics::counter;
use redis_backend::RedisBackend;
use rust_decimal::Decimal;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

/// Retrying, lock-aware front of a [`StoreBackend`].
#[derive(Clone)]
pub struct StoreService {
    backend: Arc<dyn StoreBackend>,
    retry: RetryPolicy,
    locks: KeyLocks,
}

impl StoreService {
    /// `None` selects the in-process backend.
    pub fn new(pool: Option<Pool>, retry: RetryPolicy) -> Self {
        let backend: Arc<dyn StoreBackend> = match pool {
            Some(p) => Arc::new(RedisBackend::new(p)),
            None => Arc::new(LocalBackend::new()),
        };
        Self::with_backend(backend, retry)
    }

    pub fn with_backend(backend: Arc<dyn StoreBackend>, retry: RetryPolicy) -> Self {
        Self {
            backend,
            retry,
            locks: KeyLocks::new(),
        }
    }

    async fn run<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    debug!("store {op} failed (attempt {attempt}), retrying in {delay:?}: {err}");
                    counter!("beaconflow_store_retries_total", "op" => op).increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if attempt > 1 => {
                    warn!("store {op} gave up after {attempt} attempts: {err}");
                    return Err(StoreError::Exhausted {
                        op,
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.run("GET", || self.backend.get(key)).await
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.run("SET", || self.backend.set(key, value)).await
    }

    pub async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        self.run("SETNX", || self.backend.set_nx(key, value)).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.run("EXISTS", || self.backend.exists(key)).await
    }

    pub async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.run("INCRBY", || self.backend.incr(key, delta)).await
    }

    /// Single attempt; the keep-alive loop has its own cadence.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.backend.ping().await
    }

    pub async fn get_decimal(&self, key: &str) -> Result<Option<Decimal>, StoreError> {
        match self.get(key).await? {
            Some(raw) => Decimal::from_str(raw.trim())
                .map(Some)
                .map_err(|_| StoreError::InvalidValue {
                    key: key.to_string(),
                    value: raw,
                }),
            None => Ok(None),
        }
    }

    pub async fn set_decimal(&self, key: &str, value: Decimal) -> Result<(), StoreError> {
        self.set(key, &value.to_string()).await
    }

    /// Serialises read-modify-write sequences on `key` within this process.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        self.locks.lock(key).await
    }
}
