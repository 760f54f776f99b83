pub mod beacon;
pub mod config;
pub mod hit;
pub mod keys;
pub mod logger_config;

pub use beacon::{Beacon, RawLine};
pub use config::{Config, DayBucketing, PipelineConfig, RedisConfig, StoreConfig, TailConfig};
pub use hit::{ClassifiedHit, HOME_RESOURCE_ID, ResourceType, UpdateKind, UpdateRequest};
pub use logger_config::LogConfig;
