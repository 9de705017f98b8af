//! Structured logging for Relaymesh nodes
//!
//! Every node logs through `tracing`. This crate wires up the subscriber:
//!
//! - **JSONL Output**: Structured JSON lines on the console (default)
//! - **Pretty Output**: Human-readable console output for development
//! - **File Output**: JSONL to a daily, hourly, or single log file via
//!   tracing-appender
//! - **`RUST_LOG`**: Overrides the configured default level
//!
//! # Quick Start
//!
//! ```ignore
//! use relaymesh_logging::{LogConfig, LogFormat, MeshSubscriberBuilder};
//!
//! // JSONL to console
//! MeshSubscriberBuilder::new().init();
//!
//! // Pretty console output while developing
//! MeshSubscriberBuilder::new()
//!     .with_config(LogConfig { format: LogFormat::Pretty, ansi: true, ..Default::default() })
//!     .with_level("debug")
//!     .init();
//!
//! // Keep the guard alive, or buffered file output is lost
//! let _guard = MeshSubscriberBuilder::new()
//!     .with_config(node_config.log.clone())
//!     .try_init()?;
//! ```

pub mod config;

pub use config::{FileConfig, LogConfig, LogFormat, RotationStrategy};

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::parse_filter;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Log file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Rolling appender error: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    #[error("Invalid log filter '{filter}': {reason}")]
    Filter { filter: String, reason: String },

    #[error("Global subscriber already set: {0}")]
    AlreadySet(String),
}

/// Builder for configuring and initializing the Relaymesh logging subscriber
///
/// By default, console output uses JSONL format; set [`LogFormat::Pretty`]
/// for human-readable lines.
pub struct MeshSubscriberBuilder {
    config: LogConfig,
}

impl MeshSubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Initialize the subscriber globally, reporting failures on stderr
    ///
    /// Returns a guard that must be kept alive for the duration of the
    /// program when file output is enabled.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: Failed to initialize logging: {}", e);
                None
            }
        }
    }

    /// Try to initialize the subscriber globally
    ///
    /// Fails if a global subscriber has already been set, the filter does
    /// not parse, or the log file cannot be opened.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LogError> {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| parse_filter(&self.config.level))?;
        let (layers, guard) = self.layers()?;

        Registry::default()
            .with(layers)
            .with(env_filter)
            .try_init()
            .map_err(|e| LogError::AlreadySet(e.to_string()))?;
        Ok(guard)
    }

    fn layers(&self) -> Result<(Vec<BoxedLayer>, Option<WorkerGuard>), LogError> {
        let mut layers = Vec::new();
        let mut guard = None;

        if self.config.console {
            let layer = match self.config.format {
                LogFormat::Pretty => tracing_subscriber::fmt::layer()
                    .with_ansi(self.config.ansi)
                    .with_target(true)
                    .boxed(),
                LogFormat::Json => json_layer(std::io::stdout),
            };
            match &self.config.console_level {
                Some(level) => layers.push(layer.with_filter(parse_filter(level)?).boxed()),
                None => layers.push(layer),
            }
        }

        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = file_writer(file_config)?;
            layers.push(json_layer(writer));
            guard = Some(file_guard);
        }

        Ok((layers, guard))
    }
}

impl Default for MeshSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON lines with event fields at the top level and the enclosing span
fn json_layer<W>(writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(writer)
        .boxed()
}

/// Open the file writer; `Never` truncates a single file, the others append
fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LogError> {
    let rotation = match config.rotation {
        RotationStrategy::Never => {
            fs::create_dir_all(&config.directory)?;
            let file = File::create(config.directory.join(format!("{}.log", config.prefix)))?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(config.prefix.as_str())
        .filename_suffix("log");
    if let Some(keep) = config.keep {
        builder = builder.max_log_files(keep);
    }
    let appender = builder.build(&config.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}
