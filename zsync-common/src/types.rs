//! Common types used across zsync components.

use crate::strategy::Granularity;
use crate::tags::Directives;
use crate::util::{parse_flag, split_metadata_value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Suite metadata keys understood by the listener.
pub mod keys {
    pub const PROJECT: &str = "Project";
    pub const PROJECT_KEY: &str = "ProjectKey";
    pub const VERSION: &str = "Version";
    pub const TEST_CYCLE: &str = "Testcycle";
    pub const FORCED_TEST_CYCLE: &str = "Forced Testcycle";
    pub const ISSUE_PER: &str = "Issue Per";
    pub const NO_LOGS_UPLOAD: &str = "No Logs Upload";
    pub const SKIP_STEPS: &str = "Skip Steps";
    pub const COMPONENTS: &str = "Components";
    pub const BASED_ON: &str = "Based On";
    pub const ISSUE: &str = "Issue";
    pub const ATTACH_FILE: &str = "Attachfile";
}

/// Outcome of a test, step or execution as reported to the tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Not run, ignored, or any engine status other than pass/fail.
    #[default]
    Unexecuted,
    Pass,
    Fail,
}

impl ExecutionStatus {
    /// Remote code of the transient "work in progress" status.
    pub const IN_PROGRESS_CODE: i64 = 3;

    /// Map an engine status string (`PASS`, `FAIL`, `SKIP`, `NOT RUN`, ...).
    pub fn from_engine(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "PASS" => Self::Pass,
            "FAIL" => Self::Fail,
            _ => Self::Unexecuted,
        }
    }

    /// Numeric status code used by the tracker.
    #[must_use]
    pub const fn remote_code(self) -> i64 {
        match self {
            Self::Pass => 1,
            Self::Fail => 2,
            Self::Unexecuted => -1,
        }
    }

    /// True for statuses that carry a real outcome (PASS or FAIL).
    #[must_use]
    pub const fn is_concrete(self) -> bool {
        matches!(self, Self::Pass | Self::Fail)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unexecuted => "UNEXECUTED",
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded sub-action of a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Step label as shown in the tracker (keyword name or scenario name).
    pub name: String,
    /// Comma-joined keyword arguments.
    pub params: String,
    /// Expected result text.
    pub expected: String,
    pub status: ExecutionStatus,
    /// Comment attached to the step result.
    pub comment: String,
    /// Tags of the owning test; `Ignore:<step name>` excludes this step.
    pub tags: Vec<String>,
    #[serde(default)]
    pub doc: String,
}

/// Accumulated result of one test (or one data item of a templated test).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Short test name (or scenario name for data items).
    pub name: String,
    /// Fully qualified name used for ignore matching.
    pub longname: String,
    /// Name handed to the report renderer when generating the log excerpt.
    pub report_target: String,
    pub tags: Vec<String>,
    pub directives: Directives,
    pub status: ExecutionStatus,
    pub comment: String,
    pub expected: String,
    pub params: String,
    pub template: Option<String>,
    pub doc: String,
    /// Explicit issue key for this result, if any.
    pub issue_key: Option<String>,
    /// Related issue keys (`Based On`), comma or pipe separated.
    pub based_on: Option<String>,
    pub steps: Vec<StepResult>,
}

impl TestResult {
    /// Create a fresh, unexecuted result for a test that just started.
    pub fn started(name: &str, longname: &str, tags: Vec<String>, doc: &str) -> Self {
        let directives = crate::tags::parse_tags(&tags);
        Self {
            name: name.to_string(),
            longname: longname.to_string(),
            report_target: longname.to_string(),
            issue_key: directives.issue.clone(),
            based_on: directives.based_on.clone(),
            tags,
            directives,
            status: ExecutionStatus::Unexecuted,
            comment: String::new(),
            expected: doc.to_string(),
            params: String::new(),
            template: None,
            doc: doc.to_string(),
            steps: Vec::new(),
        }
    }

    /// Replace the tag set and re-derive directives from it.
    pub fn set_tags(&mut self, tags: Vec<String>) {
        let directives = crate::tags::parse_tags(&tags);
        if directives.issue.is_some() {
            self.issue_key = directives.issue.clone();
        }
        if directives.based_on.is_some() {
            self.based_on = directives.based_on.clone();
        }
        self.directives = directives;
        self.tags = tags;
    }
}

/// Per-suite record, alive between suite start and suite end.
#[derive(Debug, Clone)]
pub struct SuiteRecord {
    pub name: String,
    pub longname: String,
    /// Source path of the suite file or directory.
    pub source: String,
    pub doc: String,
    /// Metadata merged from every ancestor directory plus the suite itself.
    pub metadata: BTreeMap<String, String>,
    pub granularity: Granularity,
}

impl SuiteRecord {
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn skip_steps(&self) -> bool {
        self.meta(keys::SKIP_STEPS).is_some_and(parse_flag)
    }

    pub fn no_logs_upload(&self) -> bool {
        self.meta(keys::NO_LOGS_UPLOAD).is_some_and(parse_flag)
    }

    pub fn attach_files(&self) -> bool {
        self.meta(keys::ATTACH_FILE).is_some_and(parse_flag)
    }

    pub fn components(&self) -> Vec<String> {
        split_metadata_value(self.meta(keys::COMPONENTS))
    }

    /// Name of the test cycle executions of this suite are filed under.
    ///
    /// `Forced Testcycle` wins over `Testcycle`; without either, the first two
    /// dot-separated segments of the suite long name are used.
    pub fn cycle_name(&self) -> String {
        let name = match self.meta(keys::TEST_CYCLE) {
            Some(cycle) => self
                .meta(keys::FORCED_TEST_CYCLE)
                .unwrap_or(cycle)
                .to_string(),
            None => self
                .longname
                .split('.')
                .take(2)
                .collect::<Vec<_>>()
                .join("."),
        };
        name.replace('\\', "/")
    }
}

/// Report upload queued after a suite has been synchronized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum PendingUpload {
    /// Attach a single-test log to a step result (per-suite reports).
    StepResult {
        step_result_id: String,
        longname: String,
    },
    /// Attach a single-test log to an execution (per-test reports).
    Execution {
        execution_id: String,
        longname: String,
    },
}

impl PendingUpload {
    pub fn entity_id(&self) -> &str {
        match self {
            Self::StepResult { step_result_id, .. } => step_result_id,
            Self::Execution { execution_id, .. } => execution_id,
        }
    }

    pub fn longname(&self) -> &str {
        match self {
            Self::StepResult { longname, .. } | Self::Execution { longname, .. } => longname,
        }
    }

    pub fn entity_type(&self) -> crate::client::EntityType {
        match self {
            Self::StepResult { .. } => crate::client::EntityType::StepResult,
            Self::Execution { .. } => crate::client::EntityType::Execution,
        }
    }
}
