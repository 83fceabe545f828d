//! Per-suite result accumulation.
//!
//! [`SuiteRun`] holds the in-memory result tree of one suite while its
//! events stream in. Keyword nesting is tracked with a depth counter; only
//! keywords directly below a test (or suite setup/teardown) and loop items
//! directly below such a keyword are recorded as steps. Everything deeper is
//! incidental library activity.
//!
//! Steps are buffered per bucket and stitched into the owning test at test
//! end, in this order: suite setup, test setup, body, test teardown. Suite
//! teardown steps are appended to every test when the suite finishes.

use crate::events::{KeywordAttrs, KeywordKind, TestAttrs};
use crate::types::{ExecutionStatus, StepResult, TestResult};
use crate::variables::{Variables, names};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Keyword that publishes a status message for later steps.
pub const STATUS_MESSAGE_KEYWORD: &str = "util.Report Status Message";

/// Keyword that captures the parameters of combinatorial tests.
pub const MACHINE_VARIABLES_KEYWORD: &str = "Set Machine Variables";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Bucket {
    SuiteSetup,
    SuiteTeardown,
    TestSetup,
    TestTeardown,
    Test(String),
}

/// Result tree of the suite currently collecting.
#[derive(Debug, Clone, Default)]
pub struct SuiteRun {
    results: Vec<TestResult>,
    steps: BTreeMap<Bucket, Vec<StepResult>>,
    current_test: Option<String>,
    depth: u32,
    keyword_message: String,
}

impl SuiteRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results in the order they were first recorded.
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    /// True while no test (or data item) has produced a result.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn current_test(&self) -> Option<&str> {
        self.current_test.as_deref()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn result(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|result| result.name == name)
    }

    pub fn result_mut(&mut self, name: &str) -> Option<&mut TestResult> {
        self.results.iter_mut().find(|result| result.name == name)
    }

    /// Insert `result`, replacing any result with the same name in place.
    pub fn upsert(&mut self, result: TestResult) {
        match self.result_mut(&result.name) {
            Some(existing) => *existing = result,
            None => self.results.push(result),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<TestResult> {
        let index = self.results.iter().position(|result| result.name == name)?;
        Some(self.results.remove(index))
    }

    pub fn start_test(&mut self, name: &str, attrs: &TestAttrs) {
        let mut result = TestResult::started(name, &attrs.longname, attrs.tags.clone(), &attrs.doc);
        result.template = attrs.template.clone().filter(|t| !t.is_empty());
        self.upsert(result);
        self.steps.insert(Bucket::Test(name.to_string()), Vec::new());
        self.current_test = Some(name.to_string());
    }

    pub fn enter_keyword(&mut self) {
        self.depth += 1;
    }

    pub fn leave_keyword(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Record the keyword that just ended as a step when it sits at a
    /// reportable depth. Call before [`leave_keyword`](Self::leave_keyword).
    pub fn record_keyword(&mut self, name: &str, attrs: &KeywordAttrs, variables: &dyn Variables) {
        let recordable = (attrs.kind.is_top_level_step() && self.depth == 1)
            || (attrs.kind == KeywordKind::TestForItem && self.depth == 2);

        if !recordable {
            if attrs.kind == KeywordKind::TestTeardown && name == STATUS_MESSAGE_KEYWORD {
                self.keyword_message = variables
                    .get_str(names::KEYWORD_MESSAGE)
                    .unwrap_or_default();
            }
            return;
        }

        let bucket = match attrs.kind {
            KeywordKind::SuiteSetup => Bucket::SuiteSetup,
            KeywordKind::SuiteTeardown => Bucket::SuiteTeardown,
            KeywordKind::TestSetup => Bucket::TestSetup,
            KeywordKind::TestTeardown => Bucket::TestTeardown,
            _ => match &self.current_test {
                Some(test) => Bucket::Test(test.clone()),
                None => {
                    debug!(keyword = name, "keyword outside of a test, not recorded");
                    return;
                }
            },
        };

        let (longname, expected) = if attrs.kind == KeywordKind::TestForItem {
            let test = self.current_test.as_deref().unwrap_or_default();
            (
                variables.get_str(&names::scenario_name(test)),
                variables
                    .get_str(&names::expected_result(test))
                    .unwrap_or_default(),
            )
        } else {
            (Some(name.to_string()), "PASS".to_string())
        };

        let Some(longname) = longname.filter(|n| !n.is_empty()) else {
            info!(keyword = name, "cannot obtain long name for keyword, step skipped");
            return;
        };

        let step = StepResult {
            name: longname,
            params: attrs.args.join(", "),
            expected,
            status: attrs
                .status
                .as_deref()
                .map(ExecutionStatus::from_engine)
                .unwrap_or_default(),
            comment: self.keyword_message.clone(),
            tags: variables.get_list(names::TEST_TAGS).unwrap_or_default(),
            doc: attrs.doc.clone(),
        };
        self.steps.entry(bucket).or_default().push(step);
    }

    /// Capture template arguments as the test's parameters.
    ///
    /// The first keyword named after the test's template (or
    /// [`MACHINE_VARIABLES_KEYWORD`]) supplies them, once.
    pub fn capture_template_params(&mut self, name: &str, attrs: &KeywordAttrs) {
        if attrs.kind != KeywordKind::Keyword {
            return;
        }
        let Some(test) = self.current_test.clone() else {
            return;
        };
        let Some(result) = self.result_mut(&test) else {
            return;
        };
        let matches_template = result.template.as_deref() == Some(name);
        if matches_template || name == MACHINE_VARIABLES_KEYWORD {
            result.params = attrs.args.join(", ");
            result.template = None;
        }
    }

    /// Finalize the test `name`; returns `false` if it was never started.
    pub fn end_test(&mut self, name: &str, attrs: &TestAttrs, variables: &dyn Variables) -> bool {
        let suite_setup = self
            .steps
            .get(&Bucket::SuiteSetup)
            .cloned()
            .unwrap_or_default();
        let test_setup = self.steps.remove(&Bucket::TestSetup).unwrap_or_default();
        let body = self
            .steps
            .remove(&Bucket::Test(name.to_string()))
            .unwrap_or_default();
        let test_teardown = self.steps.remove(&Bucket::TestTeardown).unwrap_or_default();

        self.current_test = None;
        self.depth = 0;

        let Some(result) = self.result_mut(name) else {
            return false;
        };
        if let Some(status) = &attrs.status {
            result.status = ExecutionStatus::from_engine(status);
        }
        if let Some(message) = &attrs.message {
            result.comment = message.clone();
        }
        result.set_tags(attrs.tags.clone());
        result.expected = variables
            .get_str(&names::expected_result(name))
            .unwrap_or_else(|| "PASS".to_string());
        if let Some(data) = variables.get_str(&names::test_data(name)) {
            result.params = data;
        }

        result.steps = suite_setup;
        result.steps.extend(test_setup);
        result.steps.extend(body);
        result.steps.extend(test_teardown);
        true
    }

    /// Close the suite: append suite teardown steps to every result.
    pub fn finish(&mut self) {
        let teardown = self.steps.remove(&Bucket::SuiteTeardown).unwrap_or_default();
        if teardown.is_empty() {
            return;
        }
        for result in &mut self.results {
            result.steps.extend(teardown.iter().cloned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::MapVariables;
    use serde_json::json;

    fn test_attrs(longname: &str, tags: &[&str]) -> TestAttrs {
        TestAttrs {
            longname: longname.into(),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            ..TestAttrs::default()
        }
    }

    fn keyword(run: &mut SuiteRun, vars: &MapVariables, name: &str, kind: KeywordKind) {
        run.enter_keyword();
        run.record_keyword(name, &KeywordAttrs::new(kind).with_status("PASS"), vars);
        run.leave_keyword();
    }

    #[test]
    fn test_steps_are_stitched_in_order() {
        let vars = MapVariables::new();
        let mut run = SuiteRun::new();

        keyword(&mut run, &vars, "Connect", KeywordKind::SuiteSetup);
        run.start_test("Login", &test_attrs("Root.Login", &[]));
        keyword(&mut run, &vars, "Open Browser", KeywordKind::TestSetup);
        keyword(&mut run, &vars, "Type Password", KeywordKind::Keyword);
        keyword(&mut run, &vars, "Close Browser", KeywordKind::TestTeardown);
        let mut end = test_attrs("Root.Login", &[]);
        end.status = Some("PASS".into());
        assert!(run.end_test("Login", &end, &vars));
        keyword(&mut run, &vars, "Disconnect", KeywordKind::SuiteTeardown);
        run.finish();

        let names: Vec<_> = run.results()[0]
            .steps
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "Connect",
                "Open Browser",
                "Type Password",
                "Close Browser",
                "Disconnect"
            ]
        );
        assert_eq!(run.results()[0].status, ExecutionStatus::Pass);
    }

    #[test]
    fn test_nested_keywords_are_not_steps() {
        let vars = MapVariables::new();
        let mut run = SuiteRun::new();
        run.start_test("T", &test_attrs("Root.T", &[]));

        run.enter_keyword();
        run.enter_keyword();
        run.record_keyword("Inner", &KeywordAttrs::new(KeywordKind::Keyword), &vars);
        run.leave_keyword();
        run.record_keyword("Outer", &KeywordAttrs::new(KeywordKind::Keyword), &vars);
        run.leave_keyword();

        run.end_test("T", &test_attrs("Root.T", &[]), &vars);
        let steps = &run.results()[0].steps;
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].name, "Outer");
        assert_eq!(steps[0].expected, "PASS");
    }

    #[test]
    fn test_for_item_uses_scenario_variables() {
        let mut vars = MapVariables::new();
        vars.set("${T_SCENARIO_NAME}", "admin login");
        vars.set("${T_EXPECTED_RESULT}", "logged in");
        vars.set("@{TEST_TAGS}", json!(["smoke"]));
        let mut run = SuiteRun::new();
        run.start_test("T", &test_attrs("Root.T", &[]));

        run.enter_keyword();
        run.enter_keyword();
        run.record_keyword(
            "${user} IN [ admin ]",
            &KeywordAttrs::new(KeywordKind::TestForItem)
                .with_args(["admin"])
                .with_status("FAIL"),
            &vars,
        );
        run.leave_keyword();
        run.leave_keyword();
        run.end_test("T", &test_attrs("Root.T", &[]), &vars);

        let step = &run.results()[0].steps[0];
        assert_eq!(step.name, "admin login");
        assert_eq!(step.expected, "logged in");
        assert_eq!(step.params, "admin");
        assert_eq!(step.status, ExecutionStatus::Fail);
        assert_eq!(step.tags, vec!["smoke"]);
    }

    #[test]
    fn test_for_item_without_scenario_is_skipped() {
        let vars = MapVariables::new();
        let mut run = SuiteRun::new();
        run.start_test("T", &test_attrs("Root.T", &[]));
        run.enter_keyword();
        run.enter_keyword();
        run.record_keyword("item", &KeywordAttrs::new(KeywordKind::TestForItem), &vars);
        run.leave_keyword();
        run.leave_keyword();
        run.end_test("T", &test_attrs("Root.T", &[]), &vars);
        assert!(run.results()[0].steps.is_empty());
    }

    #[test]
    fn test_status_message_becomes_step_comment() {
        let mut vars = MapVariables::new();
        vars.set("KEYWORD_MESSAGE", "checked 3 rows");
        let mut run = SuiteRun::new();
        run.start_test("T", &test_attrs("Root.T", &[]));

        run.enter_keyword();
        run.enter_keyword();
        run.record_keyword(
            STATUS_MESSAGE_KEYWORD,
            &KeywordAttrs::new(KeywordKind::TestTeardown),
            &vars,
        );
        run.leave_keyword();
        run.record_keyword("Check Rows", &KeywordAttrs::new(KeywordKind::Keyword), &vars);
        run.leave_keyword();
        run.end_test("T", &test_attrs("Root.T", &[]), &vars);

        assert_eq!(run.results()[0].steps[0].comment, "checked 3 rows");
    }

    #[test]
    fn test_end_test_reads_result_variables() {
        let mut vars = MapVariables::new();
        vars.set("T_EXPECTED_RESULT", "200 OK");
        vars.set("T_TEST_DATA", "user=admin");
        let mut run = SuiteRun::new();
        run.start_test("T", &test_attrs("Root.T", &[]));
        let mut end = test_attrs("Root.T", &["Issue:TP-7"]);
        end.status = Some("FAIL".into());
        end.message = Some("boom".into());
        run.end_test("T", &end, &vars);

        let r = &run.results()[0];
        assert_eq!(r.expected, "200 OK");
        assert_eq!(r.params, "user=admin");
        assert_eq!(r.comment, "boom");
        assert_eq!(r.issue_key.as_deref(), Some("TP-7"));
        assert_eq!(r.status, ExecutionStatus::Fail);
        assert_eq!(run.depth(), 0);
        assert!(run.current_test().is_none());
    }

    #[test]
    fn test_template_params_captured_once() {
        let mut run = SuiteRun::new();
        let mut attrs = test_attrs("Root.T", &[]);
        attrs.template = Some("Login With".into());
        run.start_test("T", &attrs);

        let kw = KeywordAttrs::new(KeywordKind::Keyword).with_args(["admin", "secret"]);
        run.capture_template_params("Login With", &kw);
        let kw2 = KeywordAttrs::new(KeywordKind::Keyword).with_args(["guest", "x"]);
        run.capture_template_params("Login With", &kw2);

        let r = run.result("T").unwrap();
        assert_eq!(r.params, "admin, secret");
        assert!(r.template.is_none());
    }

    #[test]
    fn test_end_of_unknown_test() {
        let vars = MapVariables::new();
        let mut run = SuiteRun::new();
        assert!(!run.end_test("ghost", &TestAttrs::default(), &vars));
        assert!(run.is_empty());
    }
}
