use common::model::LogConfig;
use once_cell::sync::OnceCell;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use time::UtcOffset;
use time::format_description::well_known::Rfc3339;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_log::LogTracer;
use tracing_subscriber::fmt::{self, time::OffsetTime};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::Registry;
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;
type Timer = OffsetTime<Rfc3339>;

// flushes the runtime log file when dropped at process exit
static RUNTIME_LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Process logging setup.
///
/// ```
/// use std::path::PathBuf;
/// use utils::logger::LoggerConfig;
///
/// let config = LoggerConfig::new()
///     .with_level("beaconflow=debug,info")
///     .with_file_path(PathBuf::from("/tmp/beaconflow/runtime"))
///     .with_json(true);
/// assert!(config.json);
/// ```
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// EnvFilter directive; `RUST_LOG` wins when set
    pub filter: String,
    /// Daily-rotated runtime log, `<name>.<date>.log` next to the given path
    pub runtime_log: Option<PathBuf>,
    pub stdout: bool,
    pub json: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            runtime_log: None,
            stdout: true,
            json: false,
        }
    }
}

impl From<&LogConfig> for LoggerConfig {
    fn from(section: &LogConfig) -> Self {
        Self {
            filter: section.level.clone(),
            runtime_log: section.file_path.clone(),
            stdout: section.console,
            json: section.json,
        }
    }
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(self, level: impl Into<String>) -> Self {
        Self {
            filter: level.into(),
            ..self
        }
    }

    pub fn with_file_path(self, path: PathBuf) -> Self {
        Self {
            runtime_log: Some(path),
            ..self
        }
    }

    pub fn with_console(self, stdout: bool) -> Self {
        Self { stdout, ..self }
    }

    pub fn with_json(self, json: bool) -> Self {
        Self { json, ..self }
    }

    pub fn init(self) -> Result<(), Box<dyn Error>> {
        init_logger(self)
    }
}

/// `DISABLE_LOGS` or `BEACONFLOW_DISABLE_LOGS` set to a truthy value.
pub fn is_logging_disabled() -> bool {
    ["DISABLE_LOGS", "BEACONFLOW_DISABLE_LOGS"].iter().any(|name| {
        std::env::var(name).is_ok_and(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    })
}

/// Installs the global subscriber and the `log` bridge. Only the first call has
/// an effect.
pub fn init_logger(config: LoggerConfig) -> Result<(), Box<dyn Error>> {
    if INSTALLED.swap(true, Ordering::SeqCst) || is_logging_disabled() {
        return Ok(());
    }

    LogTracer::init_with_filter(log::LevelFilter::Trace)?;

    let timer = OffsetTime::new(
        UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        Rfc3339,
    );
    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);
    if config.stdout {
        layers.push(stdout_layer(config.json, timer.clone()));
    }
    if let Some(path) = &config.runtime_log {
        layers.push(runtime_log_layer(path, config.json, timer)?);
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // try_init also attempts the log bridge, which is already in place
    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();
    Ok(())
}

fn stdout_layer(json: bool, timer: Timer) -> BoxedLayer {
    let layer = fmt::layer().with_timer(timer);
    if json {
        layer.json().boxed()
    } else {
        layer.compact().with_target(false).with_thread_ids(true).boxed()
    }
}

fn runtime_log_layer(path: &Path, json: bool, timer: Timer) -> Result<BoxedLayer, Box<dyn Error>> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let prefix = path
        .file_name()
        .map_or_else(|| "beaconflow".to_string(), |n| n.to_string_lossy().into_owned());

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(&dir)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = RUNTIME_LOG_GUARD.set(guard);

    let layer = fmt::layer().with_ansi(false).with_writer(writer).with_timer(timer);
    Ok(if json { layer.json().boxed() } else { layer.boxed() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = LoggerConfig::new()
            .with_level("warn")
            .with_file_path(PathBuf::from("/tmp/runtime"))
            .with_console(false)
            .with_json(true);
        assert_eq!(config.filter, "warn");
        assert_eq!(config.runtime_log, Some(PathBuf::from("/tmp/runtime")));
        assert!(!config.stdout);
        assert!(config.json);
    }

    #[test]
    fn built_from_logger_section() {
        let config = LoggerConfig::from(&LogConfig::default());
        assert_eq!(config.filter, "info");
        assert_eq!(config.runtime_log, Some(PathBuf::from("/tmp/log")));
        assert!(config.stdout);
        assert!(!config.json);
    }

    #[test]
    fn writes_runtime_log_file() {
        let dir = tempfile::tempdir().unwrap();
        LoggerConfig::new()
            .with_level("debug")
            .with_console(false)
            .with_file_path(dir.path().join("runtime"))
            .init()
            .unwrap();
        // a second install is a no-op
        init_logger(LoggerConfig::new()).unwrap();

        tracing::info!("through tracing");
        log::warn!("through the log facade");
    }
}
