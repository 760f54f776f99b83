//! Key-value store access for the aggregates.
//!
//! [`StoreService`] is what the pipeline talks to; it layers bounded retry and
//! per-key locking over a [`StoreBackend`], which is Redis in production and an
//! in-process map in single-node mode and tests.

mod store_service;

pub use store_service::backend::StoreBackend;
pub use store_service::key_lock::{KeyGuard, KeyLocks};
pub use store_service::local_backend::LocalBackend;
pub use store_service::redis_backend::RedisBackend;
pub use store_service::StoreService;
