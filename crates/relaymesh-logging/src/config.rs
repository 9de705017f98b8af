//! The `[log]` table of a node configuration
//!
//! ```toml
//! [log]
//! level = "info,relaymesh_routing=debug"
//! format = "pretty"
//! console_level = "warn"
//!
//! [log.file]
//! directory = "/var/log/relaymesh"
//! rotation = "hourly"
//! keep = 48
//! ```
//!
//! Every key is optional. With no table at all a node writes JSON lines to
//! stdout at `info`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::LogError;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive applied to every output; `RUST_LOG` replaces it
    pub level: String,
    /// Console line format
    pub format: LogFormat,
    /// Write to stdout
    pub console: bool,
    /// Extra filter for the console only, e.g. to keep it quieter than the file
    pub console_level: Option<String>,
    /// Colour pretty console output
    pub ansi: bool,
    /// Also write JSON lines to a log file
    pub file: Option<FileConfig>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            console: true,
            console_level: None,
            ansi: false,
            file: None,
        }
    }
}

impl LogConfig {
    /// Check that every filter directive parses
    pub fn validate(&self) -> Result<(), LogError> {
        parse_filter(&self.level)?;
        if let Some(level) = &self.console_level {
            parse_filter(level)?;
        }
        Ok(())
    }
}

pub(crate) fn parse_filter(filter: &str) -> Result<EnvFilter, LogError> {
    EnvFilter::try_new(filter).map_err(|e| LogError::Filter {
        filter: filter.to_string(),
        reason: e.to_string(),
    })
}

/// Console line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Multi-field human-readable lines
    Pretty,
}

/// Log file output, always JSON lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub directory: PathBuf,
    /// File name stem; rotated files get a date suffix
    pub prefix: String,
    pub rotation: RotationStrategy,
    /// Rotated files to retain, unbounded if unset
    pub keep: Option<usize>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            prefix: "relaymesh".to_string(),
            rotation: RotationStrategy::Daily,
            keep: Some(7),
        }
    }
}

/// When to start a new log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// One file, truncated at startup
    Never,
}
