//! Reporting strategies.
//!
//! A strategy decides how accumulated results map onto tracker issues:
//!
//! | Granularity  | Issue per     | Steps                                    |
//! |--------------|---------------|------------------------------------------|
//! | `Test Suite` | suite         | every test's recorded keywords, in order |
//! | `Test Case`  | test          | the test's recorded keywords             |
//! | `Data Item`  | loop item     | none; each item is its own virtual test  |
//!
//! The shared reconciliation steps (project/version/cycle resolution,
//! issue + links, status resolution, immediate attachments) are free
//! functions in this module so that strategies carry no state of their own.

mod data_item;
mod suite;
mod test_case;

pub use data_item::PerDataItem;
pub use suite::PerSuite;
pub use test_case::PerTestCase;

use crate::accumulator::SuiteRun;
use crate::client::{EntityType, IssueSpec, NO_VERSION, TrackerClient, TransportError};
use crate::config::Settings;
use crate::context::{ContextStore, Namespace};
use crate::errors::ErrorCode;
use crate::events::{KeywordAttrs, SuiteAttrs};
use crate::tags::{Directives, parse_tags};
use crate::types::{ExecutionStatus, StepResult, SuiteRecord, TestResult, keys};
use crate::util::split_metadata_value;
use crate::variables::{Variables, names};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Issue granularity selected by the `Issue Per` metadata key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    #[default]
    #[serde(rename = "Test Suite")]
    TestSuite,
    #[serde(rename = "Test Case")]
    TestCase,
    #[serde(rename = "Data Item")]
    DataItem,
}

impl Granularity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TestSuite => "Test Suite",
            Self::TestCase => "Test Case",
            Self::DataItem => "Data Item",
        }
    }

    /// Parse an `Issue Per` value. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Test Suite" => Some(Self::TestSuite),
            "Test Case" => Some(Self::TestCase),
            "Data Item" => Some(Self::DataItem),
            _ => None,
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconciliation stage a remote failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Project,
    Version,
    Issue,
    Links,
    Cycle,
    Execution,
    Steps,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Project => "project lookup",
            Self::Version => "version lookup",
            Self::Issue => "issue reconciliation",
            Self::Links => "link update",
            Self::Cycle => "test cycle reconciliation",
            Self::Execution => "execution reconciliation",
            Self::Steps => "step reconciliation",
        })
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{phase} failed: {source}")]
    Remote {
        phase: SyncPhase,
        #[source]
        source: TransportError,
    },

    #[error("project '{0}' not found in the tracker")]
    ProjectNotFound(String),

    #[error("no project configured for suite '{0}'")]
    MissingProject(String),
}

impl SyncError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Remote {
                source: source @ TransportError::LicenseExpired { .. },
                ..
            } => source.code(),
            Self::Remote { phase, source } => match phase {
                SyncPhase::Project => source.code(),
                SyncPhase::Version => ErrorCode::SyncVersionNotFound,
                SyncPhase::Issue | SyncPhase::Links => ErrorCode::SyncIssueFailed,
                SyncPhase::Cycle => ErrorCode::SyncCycleFailed,
                SyncPhase::Execution => ErrorCode::SyncExecutionFailed,
                SyncPhase::Steps => ErrorCode::SyncStepFailed,
            },
            Self::ProjectNotFound(_) => ErrorCode::SyncProjectNotFound,
            Self::MissingProject(_) => ErrorCode::SyncMissingProject,
        }
    }
}

/// Attach a [`SyncPhase`] to transport failures.
pub(crate) trait During<T> {
    fn during(self, phase: SyncPhase) -> Result<T, SyncError>;
}

impl<T> During<T> for Result<T, TransportError> {
    fn during(self, phase: SyncPhase) -> Result<T, SyncError> {
        self.map_err(|source| SyncError::Remote { phase, source })
    }
}

/// A data-item report step ran without naming its scenario.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "keyword \"util.Report As\" must be called for \"Issue Per  Data Item\" reports (test '{test}')"
)]
pub struct UsageError {
    pub test: String,
}

/// Everything a strategy needs at suite end.
pub struct SyncContext<'a> {
    pub client: &'a TrackerClient,
    pub settings: &'a Settings,
    pub store: &'a mut ContextStore,
    pub variables: &'a dyn Variables,
}

/// Issue granularity policy.
///
/// Accumulation hooks default to no-ops; the listener calls them after its
/// own bookkeeping for the same event.
pub trait ReportingStrategy: Send + Sync {
    fn granularity(&self) -> Granularity;

    fn on_keyword_start(&self, _run: &mut SuiteRun, _name: &str, _attrs: &KeywordAttrs) {}

    fn on_keyword_end(
        &self,
        _run: &mut SuiteRun,
        _name: &str,
        _attrs: &KeywordAttrs,
        _variables: &dyn Variables,
    ) -> Result<(), UsageError> {
        Ok(())
    }

    fn on_test_end(&self, _run: &mut SuiteRun, _name: &str) {}

    /// Reconcile the suite's results; returns the report uploads to queue.
    fn on_suite_end(
        &self,
        ctx: &mut SyncContext<'_>,
        suite: &SuiteRecord,
        end: &SuiteAttrs,
        run: &SuiteRun,
    ) -> Result<Vec<crate::types::PendingUpload>, SyncError>;

    fn execution_status_for(&self, result: &TestResult) -> ExecutionStatus {
        execution_status_for(result)
    }
}

/// Strategy implementing `granularity`.
pub fn strategy_for(granularity: Granularity) -> Arc<dyn ReportingStrategy> {
    match granularity {
        Granularity::TestSuite => Arc::new(PerSuite),
        Granularity::TestCase => Arc::new(PerTestCase),
        Granularity::DataItem => Arc::new(PerDataItem),
    }
}

// ---------------------------------------------------------------------------
// Status resolution
// ---------------------------------------------------------------------------

/// Force `UNEXECUTED` when `directives` ignore the item named `longname`.
pub fn resolve_status(
    status: ExecutionStatus,
    longname: &str,
    directives: &Directives,
) -> ExecutionStatus {
    if directives.ignores(longname) {
        ExecutionStatus::Unexecuted
    } else {
        status
    }
}

pub fn execution_status_for(result: &TestResult) -> ExecutionStatus {
    resolve_status(result.status, &result.longname, &result.directives)
}

pub fn step_status(step: &StepResult) -> ExecutionStatus {
    resolve_status(step.status, &step.name, &parse_tags(&step.tags))
}

/// Results that may reach the tracker at all; drafts and whole-test
/// ignores are dropped here.
pub fn reportable(run: &SuiteRun) -> impl Iterator<Item = &TestResult> {
    run.results().iter().filter(|result| {
        let skip = result.directives.ignores_whole_test();
        if skip {
            debug!(test = %result.longname, "ignored or draft test, not reported");
        }
        !skip
    })
}

// ---------------------------------------------------------------------------
// Shared reconciliation
// ---------------------------------------------------------------------------

/// Remote coordinates every execution of a suite is filed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub project_key: String,
    pub project_id: String,
    pub version_id: String,
    pub cycle_id: String,
}

/// Resolve project, version and cycle for a suite, using cached ids.
pub fn resolve_target(ctx: &mut SyncContext<'_>, suite: &SuiteRecord) -> Result<Target, SyncError> {
    let project_key = resolve_project_key(ctx, suite)?;
    let version_id = resolve_version_id(ctx, suite, &project_key)?;
    let project_id = resolve_project_id(ctx, &project_key)?;
    let cycle_name = suite.cycle_name();
    let cycle_id = resolve_cycle(ctx, &project_id, &version_id, &cycle_name)?;
    debug!(
        suite = %suite.longname,
        project_key = %project_key,
        project_id = %project_id,
        version_id = %version_id,
        cycle = %cycle_name,
        "suite target resolved"
    );
    Ok(Target {
        project_key,
        project_id,
        version_id,
        cycle_id,
    })
}

fn resolve_project_key(ctx: &mut SyncContext<'_>, suite: &SuiteRecord) -> Result<String, SyncError> {
    if let Some(name) = suite.meta(keys::PROJECT) {
        if let Some(key) = ctx.store.cached(Namespace::Project, name) {
            return Ok(key);
        }
        let key = ctx
            .client
            .project_key_by_name(name)
            .during(SyncPhase::Project)?
            .ok_or_else(|| SyncError::ProjectNotFound(name.to_string()))?;
        ctx.store.cache(Namespace::Project, name, &key);
        return Ok(key);
    }
    if let Some(key) = suite.meta(keys::PROJECT_KEY) {
        return Ok(key.to_string());
    }
    let default = ctx.settings.tracker.project_key.trim();
    if default.is_empty() {
        return Err(SyncError::MissingProject(suite.longname.clone()));
    }
    Ok(default.to_string())
}

fn resolve_version_id(
    ctx: &mut SyncContext<'_>,
    suite: &SuiteRecord,
    project_key: &str,
) -> Result<String, SyncError> {
    let Some(version) = suite.meta(keys::VERSION) else {
        return Ok(NO_VERSION.to_string());
    };
    let cache_key = format!("{project_key}_{version}");
    if let Some(id) = ctx.store.cached(Namespace::Version, &cache_key) {
        return Ok(id);
    }
    match ctx
        .client
        .version_id(project_key, version)
        .during(SyncPhase::Version)?
    {
        Some(id) => {
            ctx.store.cache(Namespace::Version, &cache_key, &id);
            Ok(id)
        }
        None => {
            warn!(
                code = %ErrorCode::SyncVersionNotFound.code_string(),
                project_key,
                version,
                "version not found, reporting without version"
            );
            Ok(NO_VERSION.to_string())
        }
    }
}

fn resolve_project_id(ctx: &mut SyncContext<'_>, project_key: &str) -> Result<String, SyncError> {
    if let Some(id) = ctx.store.cached(Namespace::ProjectKey, project_key) {
        return Ok(id);
    }
    let id = ctx.client.project_id(project_key).during(SyncPhase::Project)?;
    ctx.store.cache(Namespace::ProjectKey, project_key, &id);
    Ok(id)
}

fn resolve_cycle(
    ctx: &mut SyncContext<'_>,
    project_id: &str,
    version_id: &str,
    name: &str,
) -> Result<String, SyncError> {
    let cache_key = format!("{project_id}_{version_id}_{name}");
    if let Some(id) = ctx.store.cached(Namespace::Cycle, &cache_key) {
        return Ok(id);
    }
    let id = ctx
        .client
        .find_or_create_cycle(project_id, version_id, name)
        .during(SyncPhase::Cycle)?;
    ctx.store.cache(Namespace::Cycle, &cache_key, &id);
    Ok(id)
}

/// Issue-level fields of one reported item.
#[derive(Debug, Clone)]
pub struct IssueInput<'a> {
    pub issue_key: Option<&'a str>,
    pub summary: &'a str,
    pub description: &'a str,
    pub identity: &'a str,
    pub based_on: Option<&'a str>,
    /// Further link targets (`Bug` tags and the like).
    pub related: &'a [String],
}

/// Find or create the issue, then bring its links up to date.
///
/// Returns `(issue_id, issue_key)`.
pub fn sync_issue(
    ctx: &mut SyncContext<'_>,
    target: &Target,
    suite: &SuiteRecord,
    input: &IssueInput<'_>,
) -> Result<(String, String), SyncError> {
    let components = suite.components();
    let issue_key = ctx
        .client
        .find_or_create_issue(&IssueSpec {
            project_key: &target.project_key,
            issue_key: input.issue_key,
            summary: input.summary,
            description: input.description,
            custom_field: &ctx.settings.tracker.custom_field_id,
            custom_field_value: input.identity,
            components: &components,
        })
        .during(SyncPhase::Issue)?;
    let issue_id = ctx.client.issue_id(&issue_key).during(SyncPhase::Issue)?;

    let mut related = split_metadata_value(input.based_on);
    for key in input.related {
        if key != &issue_key && !related.contains(key) {
            related.push(key.clone());
        }
    }
    let update = ctx
        .client
        .update_links(&issue_key, &related)
        .during(SyncPhase::Links)?;
    for missing in &update.missing {
        warn!(
            code = %ErrorCode::TransportLinkTargetNotFound.code_string(),
            issue = %issue_key,
            target = %missing,
            "related issue not found"
        );
    }

    Ok((issue_id, issue_key))
}

/// Upload the file registered under `key` in `ATTACHMENT_PATHS` to an
/// execution right away. Failures are logged, never propagated.
pub fn attach_now(ctx: &SyncContext<'_>, execution_id: &str, key: &str) {
    let Some(paths) = ctx.variables.get(names::ATTACHMENT_PATHS) else {
        return;
    };
    let Some(file) = paths.get(key).and_then(|value| value.as_str()) else {
        debug!(key, "no attachment registered");
        return;
    };
    match ctx
        .client
        .attach(execution_id, EntityType::Execution, Path::new(file))
    {
        Ok(()) => info!(execution_id, file, "attachment uploaded"),
        Err(err) => warn!(
            code = %err.code().code_string(),
            execution_id,
            file,
            error = %err,
            "attachment upload failed"
        ),
    }
}
