//! One issue per test.

use super::{
    During, Granularity, IssueInput, ReportingStrategy, SyncContext, SyncError, SyncPhase,
    attach_now, execution_status_for, reportable, resolve_target, step_status, sync_issue,
};
use crate::accumulator::SuiteRun;
use crate::client::ExecutionSpec;
use crate::events::SuiteAttrs;
use crate::types::{PendingUpload, SuiteRecord, keys};
use crate::util::suite_identity;
use tracing::info;

/// Tag requesting an immediate attachment for a test.
pub const ATTACH_FILE_TAG: &str = "attachfile";

/// Every test is its own issue with its recorded keywords as steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerTestCase;

impl ReportingStrategy for PerTestCase {
    fn granularity(&self) -> Granularity {
        Granularity::TestCase
    }

    fn on_suite_end(
        &self,
        ctx: &mut SyncContext<'_>,
        suite: &SuiteRecord,
        _end: &SuiteAttrs,
        run: &SuiteRun,
    ) -> Result<Vec<PendingUpload>, SyncError> {
        sync_each_result(ctx, suite, run)
    }
}

/// Reconcile every reportable result of `run` as its own issue.
///
/// Shared by the per-test and per-data-item strategies.
pub(super) fn sync_each_result(
    ctx: &mut SyncContext<'_>,
    suite: &SuiteRecord,
    run: &SuiteRun,
) -> Result<Vec<PendingUpload>, SyncError> {
    let target = resolve_target(ctx, suite)?;
    let suite_id = suite_identity(&suite.source, &ctx.settings.reporting.suite_root_marker);
    let skip_steps = suite.skip_steps();
    let mut uploads = Vec::new();

    for result in reportable(run) {
        let summary = format!("{}: {}", suite.longname, result.name);
        let identity = format!("{suite_id}::{}", result.name);
        let description = if result.doc.is_empty() {
            &suite.doc
        } else {
            &result.doc
        };
        let based_on = result.based_on.as_deref().or(suite.meta(keys::BASED_ON));

        let (issue_id, issue_key) = sync_issue(
            ctx,
            &target,
            suite,
            &IssueInput {
                issue_key: result.issue_key.as_deref(),
                summary: &summary,
                description,
                identity: &identity,
                based_on,
                related: &result.directives.bugs,
            },
        )?;

        // Unexecuted tests still get their issue and links so the tracker
        // lists every known test; only the execution is left out.
        let status = execution_status_for(result);
        if !status.is_concrete() {
            info!(test = %result.longname, issue = %issue_key, %status, "no execution for unexecuted test");
            continue;
        }

        let execution_id = ctx
            .client
            .reconcile_execution(&ExecutionSpec {
                project_id: &target.project_id,
                version_id: &target.version_id,
                cycle_id: &target.cycle_id,
                issue_id: &issue_id,
                status,
                comment: &result.comment,
                skip_steps,
            })
            .during(SyncPhase::Execution)?;

        if !skip_steps {
            for step in &result.steps {
                let step_id = ctx
                    .client
                    .reconcile_step(&issue_id, &step.name, &step.params, &step.expected)
                    .during(SyncPhase::Steps)?;
                ctx.client
                    .execute_step(&step_id, &execution_id, step_status(step), &step.comment)
                    .during(SyncPhase::Steps)?;
            }
        }
        uploads.push(PendingUpload::Execution {
            execution_id: execution_id.clone(),
            longname: result.report_target.clone(),
        });

        if result.tags.iter().any(|tag| tag == ATTACH_FILE_TAG) {
            attach_now(ctx, &execution_id, &result.name);
        }
        info!(test = %result.longname, issue = %issue_key, "test case processed");
    }

    Ok(uploads)
}
