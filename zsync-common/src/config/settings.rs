//! Resolved settings.

use crate::strategy::Granularity;
use crate::util::mask_secret;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default suite-root marker used to derive issue identities.
pub const DEFAULT_SUITE_ROOT_MARKER: &str = "robot/implementation/testsuites/";
/// Default report renderer command.
pub const DEFAULT_RENDERER: &str = "rebot";
/// Default HTTP timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Complete zsync settings, one section per TOML table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub tracker: TrackerSettings,
    pub reporting: ReportingSettings,
    pub reports: ReportSettings,
    pub http: HttpSettings,
}

/// `[tracker]`: where and as whom to synchronize.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerSettings {
    pub base_url: String,
    pub user: String,
    pub password: String,
    /// Numeric id of the custom field holding the issue identity.
    pub custom_field_id: String,
    /// Project used when a suite names neither `Project` nor `ProjectKey`.
    pub project_key: String,
}

impl fmt::Debug for TrackerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerSettings")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("password", &mask_secret(&self.password))
            .field("custom_field_id", &self.custom_field_id)
            .field("project_key", &self.project_key)
            .finish()
    }
}

/// `[reporting]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportingSettings {
    /// Granularity for suites without `Issue Per` metadata.
    pub default_issue_per: Granularity,
    /// Source path prefix stripped when deriving issue identities.
    pub suite_root_marker: String,
}

impl Default for ReportingSettings {
    fn default() -> Self {
        Self {
            default_issue_per: Granularity::default(),
            suite_root_marker: DEFAULT_SUITE_ROOT_MARKER.to_string(),
        }
    }
}

/// `[reports]`: single-test report rendering and upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportSettings {
    pub renderer: String,
    /// Upload pool size; `None` means twice the available CPUs.
    pub workers: Option<usize>,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            renderer: DEFAULT_RENDERER.to_string(),
            workers: None,
        }
    }
}

impl ReportSettings {
    pub fn effective_workers(&self) -> usize {
        self.workers.filter(|n| *n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get() * 2)
                .unwrap_or(2)
        })
    }
}

/// `[http]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSettings {
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Settings {
    /// Copy with the password masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.tracker.password = mask_secret(&self.tracker.password);
        copy
    }
}
