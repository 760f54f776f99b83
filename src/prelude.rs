// Pipeline
pub use ::engine::Engine;
pub use ::engine::aggregator::Aggregator;
pub use ::engine::classifier::{ClassifierPool, classify, extract_beacon};
pub use ::engine::tailer::Tailer;
pub use ::engine::writer::PersistenceWriter;

// Model and configuration
pub use ::common::model::{
    Beacon, ClassifiedHit, Config, DayBucketing, RawLine, ResourceType, UpdateKind, UpdateRequest,
};
pub use ::common::policy::{BackoffPolicy, RetryPolicy};
pub use ::common::stats::{PipelineStats, StatsSnapshot};

// Store
pub use ::cacheable::{LocalBackend, RedisBackend, StoreBackend, StoreService};

// Errors
pub use ::errors::{
    BoxError, ConfigError, Error, ErrorKind, ParseError, PipelineError, QueueError, Result,
    StoreError, TailError,
};

// Utils
pub use ::utils::connector::create_redis_pool;
pub use ::utils::date_utils::DateUtils;
pub use ::utils::logger::{LoggerConfig, init_logger};
