use super::logger_config::LogConfig;
use crate::policy::{BackoffPolicy, RetryPolicy};
use errors::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Log tailing configuration
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TailConfig {
    /// Access log to follow
    pub log_file_path: PathBuf,
    /// Sleep between reads once the end of the file is reached
    pub poll_interval_ms: u64,
    /// Consecutive non-EOF read errors tolerated before the tailer gives up
    pub max_read_errors: u32,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            log_file_path: PathBuf::from("/usr/local/etc/nginx/logs/access.log"),
            poll_interval_ms: 3000,
            max_read_errors: 10,
        }
    }
}

impl TailConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Which clock picks the day a hit is aggregated under.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DayBucketing {
    /// Local wall-clock day at classification time
    #[default]
    Ingestion,
    /// Day of the beacon `time` parameter, falling back to ingestion
    Event,
}

/// Pipeline sizing and lifecycle
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of classification workers
    pub workers: usize,
    /// Upper bound on the shutdown drain
    pub drain_timeout_secs: u64,
    /// Interval of the stats log line, 0 disables it
    pub stats_interval_secs: u64,
    pub day_bucketing: DayBucketing,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            drain_timeout_secs: 5,
            stats_interval_secs: 60,
            day_bucketing: DayBucketing::Ingestion,
        }
    }
}

impl PipelineConfig {
    pub fn raw_capacity(&self) -> usize {
        3 * self.workers
    }

    pub fn classified_capacity(&self) -> usize {
        self.workers
    }

    pub fn update_capacity(&self) -> usize {
        self.workers
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

/// Redis Configuration
#[derive(Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis server hostname
    pub host: String,
    /// Redis server port
    pub port: u16,
    /// Redis database index
    pub db: u16,
    /// Optional Redis username
    pub username: Option<String>,
    /// Optional Redis password
    pub password: Option<String>,
    /// Connection pool size, defaults to twice the worker count
    pub pool_size: Option<usize>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            username: None,
            password: None,
            pool_size: None,
        }
    }
}

impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***REDACTED***"))
            .field("pool_size", &self.pool_size)
            .finish()
    }
}


/// Store access behaviour
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// PING interval that keeps idle pooled connections open
    pub keepalive_interval_ms: u64,
    /// Attempts per store command, including the first
    pub retry_max_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_ms: 3000,
            retry_max_attempts: 3,
            retry_base_ms: 100,
            retry_max_ms: 2000,
        }
    }
}

impl StoreConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts.max(1),
            backoff: BackoffPolicy::Exponential {
                base_ms: self.retry_base_ms,
                max_ms: self.retry_max_ms,
            },
        }
    }
}

/// Main Configuration
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub tail: TailConfig,
    pub pipeline: PipelineConfig,
    /// Absent means the in-memory store is used
    pub redis: Option<RedisConfig>,
    pub store: StoreConfig,
    pub logger: LogConfig,
}

impl Config {
    /// Loads configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config_str = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadFailed(e.into()))?;
        let config: Config = toml::from_str(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.workers == 0 {
            return Err(ConfigError::Invalid("pipeline.workers must be at least 1".into()).into());
        }
        if self.tail.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("tail.poll_interval_ms must be positive".into()).into());
        }
        if self.store.keepalive_interval_ms == 0 {
            return Err(
                ConfigError::Invalid("store.keepalive_interval_ms must be positive".into()).into(),
            );
        }
        Ok(())
    }

    /// Pool size for the store connection, twice the worker count unless set.
    pub fn redis_pool_size(&self) -> usize {
        self.redis
            .as_ref()
            .and_then(|r| r.pool_size)
            .unwrap_or(2 * self.pipeline.workers)
    }
}
