use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Process log output, the `[logger]` table of the config file.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive (trace, debug, info, warn, error, or an EnvFilter string)
    pub level: String,
    /// Runtime log file; rotated daily
    pub file_path: Option<PathBuf>,
    /// Whether to write to stdout as well
    pub console: bool,
    /// JSON lines instead of text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: Some(PathBuf::from("/tmp/log")),
            console: true,
            json: false,
        }
    }
}
