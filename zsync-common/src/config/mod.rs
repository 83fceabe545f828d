//! Configuration system for zsync.
//!
//! Settings are resolved in three layers:
//! - built-in defaults
//! - a TOML file (`--config`, `ZSYNC_CONFIG`, or `./zsync.toml` when present)
//! - `ZSYNC_*` environment variables
//!
//! The result is validated once and then shared read-only.

pub mod env;
pub mod settings;
pub mod validate;

pub use env::{EnvError, EnvParser};
pub use settings::{HttpSettings, ReportSettings, ReportingSettings, Settings, TrackerSettings};
pub use validate::{ConfigWarning, Severity, validate_config};

use crate::errors::ErrorCode;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// File name picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "zsync.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid environment overrides: {}", join(.0))]
    Env(Vec<EnvError>),

    #[error("invalid configuration: {}", join(.0))]
    Invalid(Vec<ConfigWarning>),
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::ConfigNotFound,
            Self::Read { .. } => ErrorCode::ConfigReadError,
            Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::Env(_) => ErrorCode::ConfigEnvError,
            Self::Invalid(findings) if findings.iter().any(ConfigWarning::is_credentials) => {
                ErrorCode::ConfigMissingCredentials
            }
            Self::Invalid(_) => ErrorCode::ConfigValidationError,
        }
    }
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Read a TOML settings file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Resolve defaults, file and environment, without validating.
    ///
    /// An explicit `path` (or `ZSYNC_CONFIG`) must exist; the implicit
    /// `./zsync.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut parser = EnvParser::new();
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| parser.get_string("CONFIG").map(PathBuf::from));

        let mut settings = match explicit {
            Some(path) => {
                debug!(path = %path.display(), "loading configuration");
                Self::from_file(&path)?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                debug!(path = DEFAULT_CONFIG_FILE, "loading configuration");
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        settings.apply_env(&mut parser);
        if parser.has_errors() {
            return Err(ConfigError::Env(parser.take_errors()));
        }
        Ok(settings)
    }

    /// Load and reject settings with error-severity findings.
    ///
    /// Warnings are logged and otherwise ignored.
    pub fn load_validated(path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = Self::load(path)?;
        settings.validated()
    }

    /// Validate already-resolved settings.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let (errors, warnings): (Vec<_>, Vec<_>) = validate_config(&self)
            .into_iter()
            .partition(ConfigWarning::is_error);
        for finding in &warnings {
            warn!(field = finding.field, "{}", finding.message);
        }
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Overlay `ZSYNC_*` environment variables.
    pub fn apply_env(&mut self, parser: &mut EnvParser) {
        if let Some(url) = parser.get_string("TRACKER_URL") {
            self.tracker.base_url = url;
        }
        if let Some(user) = parser.get_string("TRACKER_USER") {
            self.tracker.user = user;
        }
        if let Some(password) = parser.get_raw_string("TRACKER_PASSWORD") {
            self.tracker.password = password;
        }
        if let Some(field) = parser.get_string("CUSTOM_FIELD_ID") {
            self.tracker.custom_field_id = field;
        }
        if let Some(key) = parser.get_string("PROJECT_KEY") {
            self.tracker.project_key = key;
        }
        if let Some(granularity) = parser.get_granularity("ISSUE_PER") {
            self.reporting.default_issue_per = granularity;
        }
        if let Some(marker) = parser.get_string("SUITE_ROOT") {
            self.reporting.suite_root_marker = marker;
        }
        if let Some(renderer) = parser.get_string("RENDERER") {
            self.reports.renderer = renderer;
        }
        if let Some(workers) = parser.get_u32_range("REPORT_WORKERS", 1, 256) {
            self.reports.workers = Some(workers as usize);
        }
        if let Some(timeout) = parser.get_u64_range("HTTP_TIMEOUT_SECS", 1, 3600) {
            self.http.timeout_secs = timeout;
        }
    }
}
