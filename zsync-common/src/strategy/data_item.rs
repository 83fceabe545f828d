//! One issue per data item of a templated test.

use super::test_case::sync_each_result;
use super::{Granularity, ReportingStrategy, SyncContext, SyncError, UsageError};
use crate::accumulator::SuiteRun;
use crate::events::{KeywordAttrs, KeywordKind, SuiteAttrs};
use crate::types::{ExecutionStatus, PendingUpload, SuiteRecord};
use crate::variables::{Variables, names};
use tracing::debug;

/// Every loop item reported through `<test>_SCENARIO_NAME` becomes a
/// virtual test; the templated test itself is not reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerDataItem;

impl ReportingStrategy for PerDataItem {
    fn granularity(&self) -> Granularity {
        Granularity::DataItem
    }

    fn on_keyword_end(
        &self,
        run: &mut SuiteRun,
        _name: &str,
        attrs: &KeywordAttrs,
        variables: &dyn Variables,
    ) -> Result<(), UsageError> {
        if attrs.kind != KeywordKind::TestForItem || run.depth() != 2 {
            return Ok(());
        }
        let Some(test) = run.current_test().map(str::to_string) else {
            return Ok(());
        };
        let Some(scenario) = variables
            .get_str(&names::scenario_name(&test))
            .filter(|s| !s.is_empty())
        else {
            return Err(UsageError { test });
        };
        let Some(template) = run.result(&test) else {
            return Ok(());
        };

        let mut item = template.clone();
        let tags = variables
            .get_list(names::TEST_TAGS)
            .unwrap_or_else(|| template.tags.clone());
        item.set_tags(tags);
        item.name = scenario.clone();
        item.longname = scenario.clone();
        item.report_target = template.longname.clone();
        item.status = attrs
            .status
            .as_deref()
            .map(ExecutionStatus::from_engine)
            .unwrap_or_default();
        item.comment = String::new();
        item.doc = attrs.doc.clone();
        item.steps = Vec::new();
        if let Some(issue_key) = variables.get_str(&names::issue_key(&test)) {
            item.issue_key = Some(issue_key);
        }

        debug!(test = %test, scenario = %scenario, status = %item.status, "data item recorded");
        run.upsert(item);
        Ok(())
    }

    fn on_test_end(&self, run: &mut SuiteRun, name: &str) {
        run.remove(name);
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
