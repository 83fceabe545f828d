//! Settings validation.
//!
//! Validation never fails outright; it returns every finding with a
//! severity so `zsync config` can show the complete picture.

use super::Settings;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigWarning {
    pub field: &'static str,
    pub message: String,
    pub severity: Severity,
}

impl ConfigWarning {
    fn error(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    fn warning(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Whether this finding is about missing tracker access.
    pub fn is_credentials(&self) -> bool {
        matches!(self.field, "tracker.base_url" | "tracker.user")
    }
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.severity, self.field, self.message)
    }
}

/// Check resolved settings and return every finding.
pub fn validate_config(settings: &Settings) -> Vec<ConfigWarning> {
    let mut findings = Vec::new();
    let tracker = &settings.tracker;

    let base_url = tracker.base_url.trim();
    if base_url.is_empty() {
        findings.push(ConfigWarning::error(
            "tracker.base_url",
            "tracker base URL is not set",
        ));
    } else if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        findings.push(ConfigWarning::error(
            "tracker.base_url",
            format!("'{base_url}' is not an http(s) URL"),
        ));
    }

    if tracker.user.trim().is_empty() {
        findings.push(ConfigWarning::error("tracker.user", "tracker user is not set"));
    }
    if tracker.password.is_empty() {
        findings.push(ConfigWarning::warning(
            "tracker.password",
            "tracker password is empty",
        ));
    }

    let custom_field = tracker.custom_field_id.trim();
    if custom_field.is_empty() {
        findings.push(ConfigWarning::error(
            "tracker.custom_field_id",
            "custom field id is required to match existing issues",
        ));
    } else if !custom_field.chars().all(|c| c.is_ascii_digit()) {
        findings.push(ConfigWarning::error(
            "tracker.custom_field_id",
            format!("'{custom_field}' is not a numeric field id"),
        ));
    }

    if tracker.project_key.trim().is_empty() {
        findings.push(ConfigWarning::warning(
            "tracker.project_key",
            "no default project key; every suite must set Project or ProjectKey",
        ));
    }

    if settings.reporting.suite_root_marker.trim().is_empty() {
        findings.push(ConfigWarning::warning(
            "reporting.suite_root_marker",
            "empty suite root marker; issue identities will be full source paths",
        ));
    }

    if settings.reports.renderer.trim().is_empty() {
        findings.push(ConfigWarning::error(
            "reports.renderer",
            "report renderer command is empty",
        ));
    }
    if settings.reports.workers == Some(0) {
        findings.push(ConfigWarning::error(
            "reports.workers",
            "worker count must be at least 1",
        ));
    }

    if settings.http.timeout_secs == 0 {
        findings.push(ConfigWarning::error(
            "http.timeout_secs",
            "HTTP timeout must be at least one second",
        ));
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Settings {
        let mut settings = Settings::default();
        settings.tracker.base_url = "https://jira.example.com".into();
        settings.tracker.user = "bot".into();
        settings.tracker.password = "secret".into();
        settings.tracker.custom_field_id = "10100".into();
        settings.tracker.project_key = "TP".into();
        settings
    }

    #[test]
    fn test_valid_settings_have_no_findings() {
        assert!(validate_config(&valid()).is_empty());
    }

    #[test]
    fn test_defaults_report_missing_credentials() {
        let findings = validate_config(&Settings::default());
        let fields: Vec<_> = findings
            .iter()
            .filter(|f| f.is_error())
            .map(|f| f.field)
            .collect();
        assert_eq!(
            fields,
            vec!["tracker.base_url", "tracker.user", "tracker.custom_field_id"]
        );
        assert!(findings.iter().any(ConfigWarning::is_credentials));
    }

    #[test]
    fn test_non_numeric_custom_field_is_error() {
        let mut settings = valid();
        settings.tracker.custom_field_id = "customfield_10100".into();
        let findings = validate_config(&settings);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].is_error());
        assert!(!findings[0].is_credentials());
    }

    #[test]
    fn test_zero_workers_and_timeout_are_errors() {
        let mut settings = valid();
        settings.reports.workers = Some(0);
        settings.http.timeout_secs = 0;
        let fields: Vec<_> = validate_config(&settings).iter().map(|f| f.field).collect();
        assert_eq!(fields, vec!["reports.workers", "http.timeout_secs"]);
    }

    #[test]
    fn test_missing_project_key_is_only_warning() {
        let mut settings = valid();
        settings.tracker.project_key.clear();
        let findings = validate_config(&settings);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(
            findings[0].to_string(),
            "warning: tracker.project_key: no default project key; every suite must set Project or ProjectKey"
        );
    }
}
