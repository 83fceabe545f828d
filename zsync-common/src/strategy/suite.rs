//! One issue per suite.

use super::{
    During, Granularity, IssueInput, ReportingStrategy, SyncContext, SyncError, SyncPhase,
    attach_now, reportable, resolve_target, step_status, sync_issue,
};
use crate::accumulator::SuiteRun;
use crate::client::ExecutionSpec;
use crate::events::{KeywordAttrs, SuiteAttrs};
use crate::types::{ExecutionStatus, PendingUpload, StepResult, SuiteRecord, TestResult, keys};
use crate::util::{split_metadata_value, suite_identity};
use crate::variables::names;
use tracing::{debug, info};

/// Tag excluding a test from the suite's step list.
pub const SKIP_STEPS_TAG: &str = "Skip Steps";

/// The suite is the issue; the steps of all its tests form the step list of
/// one execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerSuite;

impl ReportingStrategy for PerSuite {
    fn granularity(&self) -> Granularity {
        Granularity::TestSuite
    }

    fn on_keyword_start(&self, run: &mut SuiteRun, name: &str, attrs: &KeywordAttrs) {
        run.capture_template_params(name, attrs);
    }

    fn on_suite_end(
        &self,
        ctx: &mut SyncContext<'_>,
        suite: &SuiteRecord,
        end: &SuiteAttrs,
        run: &SuiteRun,
    ) -> Result<Vec<PendingUpload>, SyncError> {
        let target = resolve_target(ctx, suite)?;
        let identity = suite_identity(&suite.source, &ctx.settings.reporting.suite_root_marker);

        let tests: Vec<_> = reportable(run).collect();
        let related = related_issues(&tests);

        let (issue_id, issue_key) = sync_issue(
            ctx,
            &target,
            suite,
            &IssueInput {
                issue_key: suite.meta(keys::ISSUE),
                summary: &suite.longname,
                description: &suite.doc,
                identity: &identity,
                based_on: suite.meta(keys::BASED_ON),
                related: &related,
            },
        )?;

        let status = end
            .status
            .as_deref()
            .map(ExecutionStatus::from_engine)
            .unwrap_or_default();
        let skip_steps = suite.skip_steps();
        let execution_id = ctx
            .client
            .reconcile_execution(&ExecutionSpec {
                project_id: &target.project_id,
                version_id: &target.version_id,
                cycle_id: &target.cycle_id,
                issue_id: &issue_id,
                status,
                comment: end.statistics.as_deref().unwrap_or_default(),
                skip_steps,
            })
            .during(SyncPhase::Execution)?;

        if suite.attach_files() {
            if let Some(suite_name) = ctx.variables.get_str(names::SUITE_NAME) {
                attach_now(ctx, &execution_id, &suite_name);
            }
        }

        let mut uploads = Vec::new();
        if skip_steps {
            info!(issue = %issue_key, "step reconciliation skipped");
            return Ok(uploads);
        }

        for entry in flatten_steps(&tests) {
            let step = entry.step;
            let step_id = ctx
                .client
                .reconcile_step(&issue_id, &step.name, &step.params, &step.expected)
                .during(SyncPhase::Steps)?;
            let step_result = ctx
                .client
                .execute_step(&step_id, &execution_id, entry.status, &step.comment)
                .during(SyncPhase::Steps)?;
            if let Some(step_result_id) = step_result
                && entry.status.is_concrete()
            {
                uploads.push(PendingUpload::StepResult {
                    step_result_id,
                    longname: entry.report_target.to_string(),
                });
            }
        }

        info!(suite = %suite.longname, issue = %issue_key, "suite reconciled");
        Ok(uploads)
    }
}

/// Link targets of the suite issue: every test's `Bug`, `BasedOn` and
/// `Issue` tags, first occurrence first.
fn related_issues(tests: &[&TestResult]) -> Vec<String> {
    let mut related: Vec<String> = Vec::new();
    for test in tests {
        let targets = test
            .directives
            .bugs
            .iter()
            .cloned()
            .chain(split_metadata_value(test.based_on.as_deref()))
            .chain(test.issue_key.iter().cloned());
        for target in targets {
            if !related.contains(&target) {
                related.push(target);
            }
        }
    }
    related
}

/// One entry of the suite execution's step list.
#[derive(Debug, Clone, Copy)]
struct SuiteStep<'a> {
    step: &'a StepResult,
    status: ExecutionStatus,
    report_target: &'a str,
}

/// Concatenate the stitched steps of `tests` in test order.
///
/// Steps are keyed by name on the tracker, so a repeated name (a suite
/// setup shared by every test, a keyword reused across tests) keeps its
/// first position and takes over the outcome of a later failing repeat.
fn flatten_steps<'a>(tests: &[&'a TestResult]) -> Vec<SuiteStep<'a>> {
    let mut flat: Vec<SuiteStep<'a>> = Vec::new();
    for &test in tests {
        if test.tags.iter().any(|tag| tag == SKIP_STEPS_TAG) {
            debug!(test = %test.longname, "test excluded from steps");
            continue;
        }
        let test_ignored = test.directives.ignores(&test.longname);
        for step in &test.steps {
            let status = if test_ignored {
                ExecutionStatus::Unexecuted
            } else {
                step_status(step)
            };
            let entry = SuiteStep {
                step,
                status,
                report_target: &test.report_target,
            };
            match flat.iter_mut().find(|seen| seen.step.name == step.name) {
                Some(seen) => {
                    if status == ExecutionStatus::Fail && seen.status != ExecutionStatus::Fail {
                        *seen = entry;
                    }
                }
                None => flat.push(entry),
            }
        }
    }
    flat
}
