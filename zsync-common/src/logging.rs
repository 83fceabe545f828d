//! Logging setup.
//!
//! Console output goes to stdout or stderr; an optional log file is written
//! through a non-blocking appender whose guard must outlive the program.

use crate::config::{EnvError, EnvParser};
use crate::errors::ErrorCode;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    /// Console output on stderr instead of stdout.
    pub stderr: bool,
    pub file: Option<PathBuf>,
    /// Environment values that were rejected while building this config.
    pub rejected: Vec<EnvError>,
}

impl LogConfig {
    pub fn new(level: &str) -> Self {
        Self {
            level: level.to_string(),
            format: LogFormat::default(),
            stderr: false,
            file: None,
            rejected: Vec::new(),
        }
    }

    /// Build from `ZSYNC_LOG_LEVEL`, `ZSYNC_LOG_FORMAT` and `ZSYNC_LOG_FILE`.
    pub fn from_env(default_level: &str) -> Self {
        let mut parser = EnvParser::new();
        let mut config = Self::new(default_level);

        if let Some(level) = parser.get_log_level("LOG_LEVEL") {
            config.level = level;
        }
        if let Some(format) = parser.get_string("LOG_FORMAT") {
            match LogFormat::parse(&format) {
                Some(format) => config.format = format,
                None => config.rejected.push(EnvError::InvalidValue {
                    var: parser.var_name("LOG_FORMAT"),
                    expected: "pretty, compact or json".to_string(),
                    value: format,
                }),
            }
        }
        config.file = parser.get_string("LOG_FILE").map(PathBuf::from);
        config.rejected.extend(parser.take_errors());
        config
    }

    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {message}")]
    Filter { filter: String, message: String },

    #[error("cannot open log file {path}: {message}")]
    File { path: PathBuf, message: String },

    #[error("logging already initialized: {0}")]
    Init(String),
}

impl LoggingError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InternalLoggingError
    }
}

/// Keeps background log writers alive; drop flushes them.
#[derive(Default)]
pub struct LoggingGuards {
    _file: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true);
    match format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

fn file_appender(path: &Path) -> Result<RollingFileAppender, LoggingError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LoggingError::File {
            path: path.to_path_buf(),
            message: "path has no file name".to_string(),
        })?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .map_err(|e| LoggingError::File {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| LoggingError::Filter {
            filter: config.level.clone(),
            message: e.to_string(),
        })?,
    };

    let mut guards = LoggingGuards::default();
    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.stderr {
        layers.push(fmt_layer(config.format, std::io::stderr, true));
    } else {
        layers.push(fmt_layer(config.format, std::io::stdout, true));
    }
    if let Some(path) = &config.file {
        let (writer, guard) = tracing_appender::non_blocking(file_appender(path)?);
        layers.push(fmt_layer(config.format, writer, false));
        guards._file = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    for rejected in &config.rejected {
        warn!("{rejected}");
    }
    Ok(guards)
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &["ZSYNC_LOG_LEVEL", "ZSYNC_LOG_FORMAT", "ZSYNC_LOG_FILE"];

    fn clear_env() {
        for var in VARS {
            // SAFETY: env tests are serialized
            unsafe { std::env::remove_var(var) };
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: env tests are serialized
        unsafe { std::env::set_var(key, value) };
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = LogConfig::from_env("info");
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(!config.stderr);
        assert!(config.file.is_none());
        assert!(config.rejected.is_empty());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        set_env("ZSYNC_LOG_LEVEL", "DEBUG");
        set_env("ZSYNC_LOG_FORMAT", "json");
        set_env("ZSYNC_LOG_FILE", "/tmp/zsync.log");

        let config = LogConfig::from_env("info").with_stderr();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.stderr);
        assert_eq!(config.file.as_deref(), Some(Path::new("/tmp/zsync.log")));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_rejected_values_fall_back() {
        clear_env();
        set_env("ZSYNC_LOG_LEVEL", "chatty");
        set_env("ZSYNC_LOG_FORMAT", "xml");

        let config = LogConfig::from_env("warn");
        assert_eq!(config.level, "warn");
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.rejected.len(), 2);
        clear_env();
    }

    #[test]
    fn test_with_level_overrides() {
        let config = LogConfig::new("info").with_level("trace");
        assert_eq!(config.level, "trace");
    }
}
