//! Error Catalog for zsync
//!
//! Each error carries:
//! - A unique code (ZS-E001 through ZS-E599)
//! - A human-readable message
//! - Remediation steps
//! - A pointer into the README where applicable
//!
//! # Example
//!
//! ```rust
//! use zsync_common::errors::catalog::ErrorCode;
//!
//! let entry = ErrorCode::TransportLicenseExpired.entry();
//! println!("Error {}: {}", entry.code, entry.message);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code enumeration covering all zsync error scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // =========================================================================
    // Config Errors (E001-E099)
    // =========================================================================
    /// Configuration file not found
    ConfigNotFound,
    /// Configuration file could not be read
    ConfigReadError,
    /// Configuration file contains invalid TOML syntax
    ConfigParseError,
    /// Configuration contains invalid values
    ConfigValidationError,
    /// Environment variable has invalid value
    ConfigEnvError,
    /// Tracker credentials are missing
    ConfigMissingCredentials,

    // =========================================================================
    // Transport Errors (E100-E199)
    // =========================================================================
    /// The request could not be sent or the response not read
    TransportRequestFailed,
    /// The tracker answered with a non-success status
    TransportHttpError,
    /// The tracker answered 403/405: test-management license expired
    TransportLicenseExpired,
    /// The response body was not the expected JSON
    TransportDecodeError,
    /// A link target issue does not exist
    TransportLinkTargetNotFound,

    // =========================================================================
    // Sync Errors (E200-E299)
    // =========================================================================
    /// Project could not be resolved
    SyncProjectNotFound,
    /// Version could not be resolved
    SyncVersionNotFound,
    /// Issue could not be found or created
    SyncIssueFailed,
    /// Test cycle could not be found or created
    SyncCycleFailed,
    /// Execution could not be reconciled
    SyncExecutionFailed,
    /// Test step or step result could not be reconciled
    SyncStepFailed,
    /// Issue is closed; existing key reused
    SyncIssueClosed,
    /// No project key could be determined for a suite
    SyncMissingProject,

    // =========================================================================
    // Listener Errors (E300-E399)
    // =========================================================================
    /// Event arrived in a state that cannot handle it
    ListenerEventOrder,
    /// Event log line could not be parsed
    ListenerEventParse,
    /// Metadata referenced an unknown variable
    ListenerVariableMissing,
    /// Data-item report step without a scenario name
    ListenerMissingScenarioName,

    // =========================================================================
    // Report Errors (E400-E499)
    // =========================================================================
    /// External report renderer could not be started
    ReportRendererFailed,
    /// Report attachment upload failed
    ReportUploadFailed,
    /// Renderer finished but produced no report file
    ReportOutputMissing,

    // =========================================================================
    // Internal Errors (E500-E599)
    // =========================================================================
    /// Async runtime could not be built or an upload worker crashed
    InternalRuntimeError,
    /// Logging could not be initialized
    InternalLoggingError,
}

impl ErrorCode {
    /// Returns the numeric error code (without prefix).
    #[must_use]
    pub const fn code_number(&self) -> u16 {
        match self {
            Self::ConfigNotFound => 1,
            Self::ConfigReadError => 2,
            Self::ConfigParseError => 3,
            Self::ConfigValidationError => 4,
            Self::ConfigEnvError => 5,
            Self::ConfigMissingCredentials => 6,

            Self::TransportRequestFailed => 100,
            Self::TransportHttpError => 101,
            Self::TransportLicenseExpired => 102,
            Self::TransportDecodeError => 103,
            Self::TransportLinkTargetNotFound => 104,

            Self::SyncProjectNotFound => 200,
            Self::SyncVersionNotFound => 201,
            Self::SyncIssueFailed => 202,
            Self::SyncCycleFailed => 203,
            Self::SyncExecutionFailed => 204,
            Self::SyncStepFailed => 205,
            Self::SyncIssueClosed => 206,
            Self::SyncMissingProject => 207,

            Self::ListenerEventOrder => 300,
            Self::ListenerEventParse => 301,
            Self::ListenerVariableMissing => 302,
            Self::ListenerMissingScenarioName => 303,

            Self::ReportRendererFailed => 400,
            Self::ReportUploadFailed => 401,
            Self::ReportOutputMissing => 402,

            Self::InternalRuntimeError => 500,
            Self::InternalLoggingError => 501,
        }
    }

    /// Returns the formatted error code string (e.g., "ZS-E001").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("ZS-E{:03}", self.code_number())
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self.code_number() {
            1..=99 => ErrorCategory::Config,
            100..=199 => ErrorCategory::Transport,
            200..=299 => ErrorCategory::Sync,
            300..=399 => ErrorCategory::Listener,
            400..=499 => ErrorCategory::Report,
            _ => ErrorCategory::Internal,
        }
    }

    /// Returns the full error entry with all metadata.
    #[must_use]
    pub fn entry(&self) -> ErrorEntry {
        ErrorEntry {
            code: self.code_string(),
            category: self.category(),
            message: self.message().to_string(),
            remediation: self
                .remediation()
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            doc_url: self.doc_url().map(String::from),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ConfigNotFound => "Configuration file not found",
            Self::ConfigReadError => "Failed to read configuration file",
            Self::ConfigParseError => "Configuration file contains invalid TOML syntax",
            Self::ConfigValidationError => "Configuration contains invalid values",
            Self::ConfigEnvError => "Environment variable has an invalid value",
            Self::ConfigMissingCredentials => "Tracker URL or credentials are not configured",

            Self::TransportRequestFailed => "Request to the tracker failed",
            Self::TransportHttpError => "Tracker returned an error status",
            Self::TransportLicenseExpired => "Test-management license expired or access denied",
            Self::TransportDecodeError => "Tracker response could not be decoded",
            Self::TransportLinkTargetNotFound => "Linked issue does not exist",

            Self::SyncProjectNotFound => "Project not found in the tracker",
            Self::SyncVersionNotFound => "Version not found in the project",
            Self::SyncIssueFailed => "Issue could not be found or created",
            Self::SyncCycleFailed => "Test cycle could not be found or created",
            Self::SyncExecutionFailed => "Execution could not be reconciled",
            Self::SyncStepFailed => "Test step could not be reconciled",
            Self::SyncIssueClosed => "Issue is closed; reusing existing key",
            Self::SyncMissingProject => "No project configured for the suite",

            Self::ListenerEventOrder => "Lifecycle event arrived out of order",
            Self::ListenerEventParse => "Event log line could not be parsed",
            Self::ListenerVariableMissing => "Suite metadata references an unknown variable",
            Self::ListenerMissingScenarioName => "Data-item report step has no scenario name",

            Self::ReportRendererFailed => "Report renderer could not be started",
            Self::ReportUploadFailed => "Report attachment upload failed",
            Self::ReportOutputMissing => "Report renderer produced no output",

            Self::InternalRuntimeError => "Upload runtime or worker failed",
            Self::InternalLoggingError => "Logging could not be initialized",
        }
    }

    /// Returns remediation steps for this error.
    #[must_use]
    pub const fn remediation(&self) -> &'static [&'static str] {
        match self {
            Self::ConfigNotFound => &[
                "Pass the path with --config",
                "Set ZSYNC_CONFIG to the configuration file",
                "Print the effective configuration: zsync config",
            ],
            Self::ConfigReadError => &[
                "Check file permissions",
                "Verify the path points to a file, not a directory",
            ],
            Self::ConfigParseError => &[
                "Check the TOML syntax near the reported line",
                "Compare with the sample in the README",
            ],
            Self::ConfigValidationError => &[
                "Review the reported field",
                "Print the effective configuration: zsync config",
            ],
            Self::ConfigEnvError => &[
                "Check ZSYNC_* environment variables",
                "Unset the variable to fall back to the file value",
            ],
            Self::ConfigMissingCredentials => &[
                "Set [tracker] base_url, user and password",
                "Or export ZSYNC_TRACKER_URL, ZSYNC_TRACKER_USER and ZSYNC_TRACKER_PASSWORD",
            ],

            Self::TransportRequestFailed => &[
                "Check network connectivity to the tracker",
                "Verify the base URL",
                "Increase [http] timeout_secs for slow servers",
            ],
            Self::TransportHttpError => &[
                "Read the response body included in the error",
                "Verify the user can access the project",
            ],
            Self::TransportLicenseExpired => &[
                "Renew the test-management add-on license",
                "Verify the user has the test-management permission",
            ],
            Self::TransportDecodeError => &[
                "Verify the base URL points to the tracker, not a proxy page",
                "Check the tracker and add-on versions",
            ],
            Self::TransportLinkTargetNotFound => &[
                "Fix the BasedOn/Bug tag or Based On metadata",
                "The link is skipped; the run continues",
            ],

            Self::SyncProjectNotFound => &[
                "Check the Project or ProjectKey suite metadata",
                "Set [tracker] project_key as a default",
            ],
            Self::SyncVersionNotFound => &[
                "Check the Version suite metadata",
                "Create the version in the project first",
            ],
            Self::SyncIssueFailed => &[
                "Verify [tracker] custom_field_id names an existing field",
                "Check the Components metadata against the project",
            ],
            Self::SyncCycleFailed => &[
                "Check the Testcycle metadata",
                "Verify the user can create cycles in the project",
            ],
            Self::SyncExecutionFailed => &[
                "Re-run the suite; executions are recreated on each run",
                "Check concurrent runs against the same cycle",
            ],
            Self::SyncStepFailed => &[
                "Check the issue is editable",
                "Set Skip Steps metadata to bypass step reconciliation",
            ],
            Self::SyncIssueClosed => &[
                "Reopen the issue if its fields should be updated",
                "No action needed; the execution is still recorded",
            ],
            Self::SyncMissingProject => &[
                "Add ProjectKey or Project suite metadata",
                "Set [tracker] project_key as a default",
            ],

            Self::ListenerEventOrder => &[
                "Check the event log for missing start events",
                "Report a bug with the event log attached",
            ],
            Self::ListenerEventParse => &[
                "Check the event log is JSON lines",
                "Verify the event names and attribute fields",
            ],
            Self::ListenerVariableMissing => &[
                "Define the variable before the suite ends",
                "Remove the ${...} reference from the metadata",
            ],
            Self::ListenerMissingScenarioName => &[
                "Call the data-item report keyword inside each iteration",
                "Set <test>_SCENARIO_NAME before the iteration ends",
            ],

            Self::ReportRendererFailed => &[
                "Verify the renderer is installed and on PATH",
                "Set [reports] renderer to the full path",
            ],
            Self::ReportUploadFailed => &[
                "Check attachment size limits on the tracker",
                "Re-run the replay to upload again",
            ],
            Self::ReportOutputMissing => &[
                "Check the test name exists in the output file",
                "Run the renderer manually with the logged arguments",
            ],

            Self::InternalRuntimeError => &[
                "Check thread limits on the host",
                "Lower [reports] workers",
                "Look for a renderer panic in the log output",
            ],
            Self::InternalLoggingError => &[
                "Check ZSYNC_LOG_FILE directory permissions",
                "Verify ZSYNC_LOG_LEVEL is a valid filter",
            ],
        }
    }

    /// Returns the README section documenting this error, if any.
    #[must_use]
    pub const fn doc_url(&self) -> Option<&'static str> {
        match self.category() {
            ErrorCategory::Config => Some("README.md#configuration"),
            ErrorCategory::Transport => Some("README.md#tracker-access"),
            ErrorCategory::Sync => Some("README.md#reporting-strategies"),
            ErrorCategory::Listener => Some("README.md#event-logs"),
            ErrorCategory::Report => Some("README.md#report-uploads"),
            ErrorCategory::Internal => None,
        }
    }

    /// Returns all error codes.
    #[must_use]
    pub const fn all() -> &'static [ErrorCode] {
        &[
            Self::ConfigNotFound,
            Self::ConfigReadError,
            Self::ConfigParseError,
            Self::ConfigValidationError,
            Self::ConfigEnvError,
            Self::ConfigMissingCredentials,
            Self::TransportRequestFailed,
            Self::TransportHttpError,
            Self::TransportLicenseExpired,
            Self::TransportDecodeError,
            Self::TransportLinkTargetNotFound,
            Self::SyncProjectNotFound,
            Self::SyncVersionNotFound,
            Self::SyncIssueFailed,
            Self::SyncCycleFailed,
            Self::SyncExecutionFailed,
            Self::SyncStepFailed,
            Self::SyncIssueClosed,
            Self::SyncMissingProject,
            Self::ListenerEventOrder,
            Self::ListenerEventParse,
            Self::ListenerVariableMissing,
            Self::ListenerMissingScenarioName,
            Self::ReportRendererFailed,
            Self::ReportUploadFailed,
            Self::ReportOutputMissing,
            Self::InternalRuntimeError,
            Self::InternalLoggingError,
        ]
    }

    /// Looks up a code by its string form (`ZS-E102`, `E102` or `102`).
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        let digits = code
            .trim()
            .trim_start_matches("ZS-")
            .trim_start_matches(['E', 'e']);
        let number: u16 = digits.parse().ok()?;
        Self::all()
            .iter()
            .copied()
            .find(|candidate| candidate.code_number() == number)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_string(), self.message())
    }
}

/// Error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Configuration and setup errors (E001-E099)
    Config,
    /// Tracker HTTP errors (E100-E199)
    Transport,
    /// Reconciliation errors (E200-E299)
    Sync,
    /// Event handling errors (E300-E399)
    Listener,
    /// Report rendering and upload errors (E400-E499)
    Report,
    /// Internal/unexpected errors (E500-E599)
    Internal,
}

impl ErrorCategory {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Config => "Configuration",
            Self::Transport => "Transport",
            Self::Sync => "Synchronization",
            Self::Listener => "Listener",
            Self::Report => "Report",
            Self::Internal => "Internal",
        }
    }

    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Config => "Configuration file and environment setup issues",
            Self::Transport => "HTTP communication with the tracker",
            Self::Sync => "Issue, cycle, execution and step reconciliation",
            Self::Listener => "Lifecycle event handling",
            Self::Report => "Per-test report rendering and attachment upload",
            Self::Internal => "Internal errors that may indicate bugs",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Complete error entry with all metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Error code string (e.g., "ZS-E001")
    pub code: String,
    pub category: ErrorCategory,
    pub message: String,
    pub remediation: Vec<String>,
    pub doc_url: Option<String>,
}

impl ErrorEntry {
    /// Formats the error for display with full remediation steps.
    #[must_use]
    pub fn format_full(&self) -> String {
        let mut output = format!("[{}] {}\n\n", self.code, self.message);

        if !self.remediation.is_empty() {
            output.push_str("Remediation steps:\n");
            for (i, step) in self.remediation.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, step));
            }
        }

        if let Some(url) = &self.doc_url {
            output.push_str(&format!("\nFor more information: {}\n", url));
        }

        output
    }

    /// Formats the error as a single line.
    #[must_use]
    pub fn format_brief(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_brief())
    }
}
