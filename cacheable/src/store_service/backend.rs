use errors::StoreError;

/// The store primitives the aggregates need. Values are decimal strings.
#[async_trait::async_trait]
pub trait StoreBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Sets `key` only when absent; returns whether it was written.
    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError>;
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
    /// Atomic integer increment, creating the key at `delta` when absent.
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}
