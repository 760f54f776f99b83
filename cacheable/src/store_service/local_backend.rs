use super::backend::StoreBackend;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use errors::StoreError;

/// In-process store used in single-node mode and by tests.
#[derive(Default)]
pub struct LocalBackend {
    pub(crate) store: DashMap<String, String>,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Synchronous read for assertions and diagnostics.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.store.get(key).map(|v| v.value().clone())
    }
}

#[async_trait::async_trait]
impl StoreBackend for LocalBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.store.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        match self.store.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(value.to_string());
                Ok(true)
            }
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.store.contains_key(key))
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get().parse::<i64>().map_err(|_| StoreError::InvalidValue {
                    key: key.to_string(),
                    value: occupied.get().clone(),
                })?;
                let new_val = current + delta;
                occupied.insert(new_val.to_string());
                Ok(new_val)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(delta.to_string());
                Ok(delta)
            }
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
