use deadpool_redis::redis::RedisError;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Boxed error detail carried as a source.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Tail,
    Parse,
    Store,
    Queue,
    Pipeline,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Config => write!(f, "config"),
            ErrorKind::Tail => write!(f, "tail"),
            ErrorKind::Parse => write!(f, "parse"),
            ErrorKind::Store => write!(f, "store"),
            ErrorKind::Queue => write!(f, "queue"),
            ErrorKind::Pipeline => write!(f, "pipeline"),
        }
    }
}

pub struct ErrorInner {
    pub kind: ErrorKind,
    pub source: Option<BoxError>,
    pub message: Option<String>,
}

pub struct Error {
    pub inner: Box<ErrorInner>,
}

impl Error {
    pub fn new<E>(kind: ErrorKind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(ErrorInner {
                kind,
                source: source.map(Into::into),
                message: None,
            }),
        }
    }

    pub fn with_message<E>(kind: ErrorKind, message: impl Into<String>, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(ErrorInner {
                kind,
                source: source.map(Into::into),
                message: Some(message.into()),
            }),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.inner.kind
    }

    pub fn is_config(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Config)
    }

    pub fn is_tail(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Tail)
    }

    pub fn is_parse(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Parse)
    }

    pub fn is_store(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Store)
    }

    pub fn is_queue(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Queue)
    }

    pub fn is_pipeline(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Pipeline)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("beaconflow::Error");
        f.field("kind", &self.inner.kind);
        if let Some(ref message) = self.inner.message {
            f.field("message", message);
        }
        if let Some(ref source) = self.inner.source {
            f.field("source", source);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref message) = self.inner.message {
            write!(f, "{} error: {}", self.inner.kind, message)?;
        } else {
            write!(f, "{} error", self.inner.kind)?;
        }

        if let Some(ref source) = self.inner.source {
            write!(f, ": {source}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|e| &**e as &(dyn StdError + 'static))
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::new(ErrorKind::Config, Some(err))
    }
}

impl From<TailError> for Error {
    fn from(err: TailError) -> Self {
        Error::new(ErrorKind::Tail, Some(err))
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::new(ErrorKind::Parse, Some(err))
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::new(ErrorKind::Store, Some(err))
    }
}

impl From<QueueError> for Error {
    fn from(err: QueueError) -> Self {
        Error::new(ErrorKind::Queue, Some(err))
    }
}

impl From<PipelineError> for Error {
    fn from(err: PipelineError) -> Self {
        Error::new(ErrorKind::Pipeline, Some(err))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    ReadFailed(#[source] BoxError),
    #[error("parse config failed: {0}")]
    ParseFailed(#[source] BoxError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum TailError {
    #[error("open log file {path} failed: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("giving up after {count} consecutive read errors: {source}")]
    TooManyReadErrors {
        count: u32,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("tracking marker not found")]
    MissingMarker,
    #[error("beacon query has no url parameter")]
    MissingUrl,
    #[error("response time delimiters not found")]
    MissingResponseTime,
    #[error("invalid response time: {0}")]
    InvalidResponseTime(String),
    #[error("invalid resource id: {0}")]
    InvalidResourceId(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("pool error: {0}")]
    Pool(String),
    #[error("redis error: {0}")]
    Redis(#[from] RedisError),
    #[error("value at {key} is not a number: {value}")]
    InvalidValue { key: String, value: String },
    #[error("value at {key} would overflow")]
    Overflow { key: String },
    #[error("{op} failed after {attempts} attempts: {source}")]
    Exhausted {
        op: &'static str,
        attempts: u32,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Whether retrying the same command may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Pool(_) => true,
            StoreError::Redis(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
            }
            StoreError::InvalidValue { .. } | StoreError::Overflow { .. } | StoreError::Exhausted { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("{0} queue closed")]
    Closed(&'static str),
    #[error("cancelled while waiting on {0} queue")]
    Cancelled(&'static str),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} stage panicked")]
    StagePanicked { stage: &'static str },
    #[error("drain did not finish within {0} seconds")]
    DrainTimeout(u64),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::from(ConfigError::ParseFailed(err.into()))
    }
}
