//! Builders for engine events and a tracker-backed listener.

use std::path::Path;
use std::sync::{Arc, Mutex};
use zsync_common::dispatcher::RenderError;
use zsync_common::{
    KeywordAttrs, KeywordKind, Listener, MapVariables, MockTracker, ReportDispatcher,
    ReportRenderer, Settings, SuiteAttrs, TestAttrs,
};

pub const PROJECT_KEY: &str = "DEMO";
pub const CUSTOM_FIELD: &str = "10100";
pub const SUITE_ROOT: &str = "/work/robot/implementation/testsuites/";

pub fn settings() -> Arc<Settings> {
    let mut settings = Settings::default();
    settings.tracker.custom_field_id = CUSTOM_FIELD.into();
    settings.tracker.project_key = PROJECT_KEY.into();
    settings.reports.workers = Some(2);
    Arc::new(settings)
}

/// Tracker seeded with the default project and a couple of linkable issues.
pub fn seeded_tracker() -> Arc<MockTracker> {
    let tracker = MockTracker::new();
    tracker.add_project(PROJECT_KEY, "Demo Project");
    tracker.add_project("PROJ", "Linked Project");
    tracker.add_version(PROJECT_KEY, "1.0");
    tracker
}

/// Renderer that writes a tiny HTML file instead of running a process.
#[derive(Debug, Default)]
pub struct StubRenderer {
    pub rendered: Mutex<Vec<String>>,
}

impl ReportRenderer for StubRenderer {
    fn render(&self, _output: &Path, longname: &str, report: &Path) -> Result<(), RenderError> {
        self.rendered
            .lock()
            .unwrap()
            .push(longname.to_string());
        std::fs::write(report, format!("<html>{longname}</html>"))
            .map_err(|err| RenderError::Failed(err.to_string()))
    }
}

pub fn listener(tracker: &Arc<MockTracker>) -> Listener<MapVariables> {
    listener_with_renderer(tracker, Arc::new(StubRenderer::default()))
}

pub fn listener_with_renderer(
    tracker: &Arc<MockTracker>,
    renderer: Arc<StubRenderer>,
) -> Listener<MapVariables> {
    let dispatcher = ReportDispatcher::new(tracker.client(), renderer, 2);
    Listener::new(tracker.client(), settings(), MapVariables::new()).with_dispatcher(dispatcher)
}

pub fn suite(longname: &str, file: &str, metadata: &[(&str, &str)]) -> SuiteAttrs {
    SuiteAttrs {
        longname: longname.into(),
        source: Some(format!("{SUITE_ROOT}{file}")),
        doc: format!("{longname} documentation"),
        metadata: metadata
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
        ..SuiteAttrs::default()
    }
}

pub fn suite_end(attrs: &SuiteAttrs, status: &str) -> SuiteAttrs {
    SuiteAttrs {
        status: Some(status.into()),
        statistics: Some("1 test, 1 passed, 0 failed".into()),
        ..attrs.clone()
    }
}

pub fn test(longname: &str, tags: &[&str]) -> TestAttrs {
    TestAttrs {
        longname: longname.into(),
        tags: tags.iter().map(|t| (*t).to_string()).collect(),
        ..TestAttrs::default()
    }
}

pub fn test_end(attrs: &TestAttrs, status: &str) -> TestAttrs {
    TestAttrs {
        status: Some(status.into()),
        ..attrs.clone()
    }
}

/// Run one top-level keyword inside the current test.
pub fn keyword(listener: &mut Listener<MapVariables>, name: &str, args: &[&str], status: &str) {
    let attrs = KeywordAttrs::new(KeywordKind::Keyword).with_args(args.iter().copied());
    listener.start_keyword(name, &attrs).unwrap();
    listener
        .end_keyword(name, &attrs.clone().with_status(status))
        .unwrap();
}

/// Run a complete test with the given keywords.
pub fn run_test(
    listener: &mut Listener<MapVariables>,
    name: &str,
    attrs: &TestAttrs,
    keywords: &[(&str, &str)],
    status: &str,
) {
    listener.start_test(name, attrs).unwrap();
    for (keyword_name, keyword_status) in keywords {
        keyword(listener, keyword_name, &[], keyword_status);
    }
    listener.end_test(name, &test_end(attrs, status)).unwrap();
}

/// Issue fields as stored by the tracker, with the identity custom field.
pub fn issue_fields(summary: &str, description: &str, identity: &str) -> serde_json::Value {
    let mut fields = serde_json::Map::new();
    fields.insert("summary".into(), summary.into());
    fields.insert("description".into(), description.into());
    fields.insert(format!("customfield_{CUSTOM_FIELD}"), identity.into());
    serde_json::Value::Object(fields)
}
