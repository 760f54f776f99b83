use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// In-process per-key mutexes serialising read-modify-write sequences.
///
/// Entries are created on first use and removed again when the last holder
/// releases its guard, so the map only holds keys that are currently busy.
#[derive(Clone, Default)]
pub struct KeyLocks {
    map: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyGuard {
        let mutex = self
            .map
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.clone().lock_owned().await;
        KeyGuard {
            key: key.to_string(),
            map: self.map.clone(),
            mutex: Some(mutex),
            guard: Some(guard),
        }
    }

    /// Number of keys with a live guard or waiter.
    pub fn active(&self) -> usize {
        self.map.len()
    }
}

pub struct KeyGuard {
    key: String,
    map: Arc<DashMap<String, Arc<Mutex<()>>>>,
    mutex: Option<Arc<Mutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // the owned guard holds its own Arc; release it before counting
        self.guard.take();
        // map entry + our clone
        self.map
            .remove_if(&self.key, |_, m| Arc::strong_count(m) == 2);
        self.mutex.take();
    }
}
