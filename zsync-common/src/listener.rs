//! Listener state machine.
//!
//! The engine drives [`Listener`] through its lifecycle callbacks, strictly
//! in order. Every open suite owns a frame (record, accumulated run, and the
//! strategy selected for it); frames form a stack so nested suites never mix
//! their results. Per suite the phases are
//! `Idle -> Collecting -> Reconciling -> Idle`.

use crate::accumulator::SuiteRun;
use crate::client::TrackerClient;
use crate::config::Settings;
use crate::context::ContextStore;
use crate::dispatcher::{CommandRenderer, DispatchError, DispatchSummary, ReportDispatcher};
use crate::errors::ErrorCode;
use crate::events::{KeywordAttrs, ListenerEvent, SuiteAttrs, TestAttrs};
use crate::strategy::{
    Granularity, ReportingStrategy, SyncContext, SyncError, UsageError, strategy_for,
};
use crate::types::{PendingUpload, SuiteRecord, keys};
use crate::variables::Variables;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No suite is open.
    Idle,
    /// At least one suite is open and receiving events.
    Collecting,
    /// A finished suite is being synchronized with the tracker.
    Reconciling,
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("synchronization of suite '{suite}' failed: {source}")]
    Sync {
        suite: String,
        #[source]
        source: SyncError,
    },

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error("unexpected {event}: {detail}")]
    EventOrder { event: &'static str, detail: String },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl ListenerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Sync { source, .. } => source.code(),
            Self::Usage(_) => ErrorCode::ListenerMissingScenarioName,
            Self::EventOrder { .. } => ErrorCode::ListenerEventOrder,
            Self::Dispatch(err) => err.code(),
        }
    }

    fn order(event: &'static str, detail: impl Into<String>) -> Self {
        Self::EventOrder {
            event,
            detail: detail.into(),
        }
    }
}

struct SuiteFrame {
    record: SuiteRecord,
    run: SuiteRun,
    strategy: Arc<dyn ReportingStrategy>,
}

/// Engine listener that synchronizes finished suites with the tracker.
pub struct Listener<V: Variables> {
    client: TrackerClient,
    settings: Arc<Settings>,
    variables: V,
    store: ContextStore,
    dispatcher: ReportDispatcher,
    frames: Vec<SuiteFrame>,
    phase: Phase,
    pending: Vec<PendingUpload>,
    no_logs_upload: bool,
}

/// Source path used for metadata inheritance.
///
/// Suites without a source are placed under their dotted long name.
fn suite_source(attrs: &SuiteAttrs) -> String {
    match attrs.source.as_deref().filter(|s| !s.is_empty()) {
        Some(source) => source.to_string(),
        None => format!("/{}", attrs.longname.replace('.', "/")),
    }
}

impl<V: Variables> Listener<V> {
    pub fn new(client: TrackerClient, settings: Arc<Settings>, variables: V) -> Self {
        let renderer = Arc::new(CommandRenderer::new(settings.reports.renderer.clone()));
        let dispatcher = ReportDispatcher::new(
            client.clone(),
            renderer,
            settings.reports.effective_workers(),
        );
        Self {
            client,
            settings,
            variables,
            store: ContextStore::new(),
            dispatcher,
            frames: Vec::new(),
            phase: Phase::Idle,
            pending: Vec::new(),
            no_logs_upload: false,
        }
    }

    /// Replace the report dispatcher (custom renderer or pool size).
    pub fn with_dispatcher(mut self, dispatcher: ReportDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn variables(&self) -> &V {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut V {
        &mut self.variables
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    /// Uploads queued so far and not yet dispatched.
    pub fn pending_uploads(&self) -> &[PendingUpload] {
        &self.pending
    }

    pub fn uploads_disabled(&self) -> bool {
        self.no_logs_upload
    }

    /// Number of currently open suites.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn frame(&mut self, event: &'static str, name: &str) -> Result<&mut SuiteFrame, ListenerError> {
        self.frames
            .last_mut()
            .ok_or_else(|| ListenerError::order(event, format!("'{name}' outside of any suite")))
    }

    fn granularity_for(&self, metadata: &BTreeMap<String, String>, suite: &str) -> Granularity {
        let default = self.settings.reporting.default_issue_per;
        match metadata.get(keys::ISSUE_PER).map(|v| v.trim()) {
            None | Some("") => default,
            Some(value) => Granularity::parse(value).unwrap_or_else(|| {
                warn!(suite, value, fallback = %default, "unknown 'Issue Per' value");
                default
            }),
        }
    }

    pub fn start_suite(&mut self, name: &str, attrs: &SuiteAttrs) {
        let source = suite_source(attrs);
        self.store.store_metadata(&source, &attrs.metadata);
        let metadata = self.store.metadata(&source);
        let granularity = self.granularity_for(&metadata, &attrs.longname);

        let record = SuiteRecord {
            name: name.to_string(),
            longname: attrs.longname.clone(),
            source,
            doc: attrs.doc.clone(),
            metadata,
            granularity,
        };
        if record.no_logs_upload() && !self.no_logs_upload {
            info!(suite = %record.longname, "report uploads disabled by suite metadata");
            self.no_logs_upload = true;
        }
        debug!(suite = %record.longname, %granularity, "suite started");

        self.frames.push(SuiteFrame {
            record,
            run: SuiteRun::new(),
            strategy: strategy_for(granularity),
        });
        self.phase = Phase::Collecting;
    }

    /// Close the innermost suite and synchronize it.
    ///
    /// The suite's accumulated state is discarded whether or not the
    /// synchronization succeeds.
    pub fn end_suite(&mut self, name: &str, attrs: &SuiteAttrs) -> Result<(), ListenerError> {
        let Some(SuiteFrame {
            mut record,
            mut run,
            strategy,
        }) = self.frames.pop()
        else {
            return Err(ListenerError::order(
                "end_suite",
                format!("'{name}' without a matching start_suite"),
            ));
        };
        run.finish();

        let result = if run.is_empty() {
            debug!(suite = %record.longname, "suite produced no results, nothing to synchronize");
            Ok(())
        } else {
            self.phase = Phase::Reconciling;
            record.metadata = self.resolved_metadata(&record);
            debug!(suite = %record.longname, metadata = ?record.metadata, "synchronizing suite");

            let mut ctx = SyncContext {
                client: &self.client,
                settings: &self.settings,
                store: &mut self.store,
                variables: &self.variables,
            };
            match strategy.on_suite_end(&mut ctx, &record, attrs, &run) {
                Ok(uploads) => {
                    info!(
                        suite = %record.longname,
                        granularity = %strategy.granularity(),
                        queued = uploads.len(),
                        "suite synchronized"
                    );
                    self.pending.extend(uploads);
                    Ok(())
                }
                Err(source) => Err(ListenerError::Sync {
                    suite: record.longname.clone(),
                    source,
                }),
            }
        };

        self.phase = if self.frames.is_empty() {
            Phase::Idle
        } else {
            Phase::Collecting
        };
        result
    }

    /// Metadata at the suite's source with `${var}` references replaced.
    fn resolved_metadata(&self, record: &SuiteRecord) -> BTreeMap<String, String> {
        self.store
            .metadata(&record.source)
            .into_iter()
            .map(|(key, value)| {
                let value = match self.variables.replace_variables(&value) {
                    Ok(replaced) => replaced,
                    Err(err) => {
                        warn!(
                            code = %ErrorCode::ListenerVariableMissing.code_string(),
                            key = %key,
                            value = %value,
                            error = %err,
                            "failed to replace variables in metadata"
                        );
                        value
                    }
                };
                (key, value)
            })
            .collect()
    }

    pub fn start_test(&mut self, name: &str, attrs: &TestAttrs) -> Result<(), ListenerError> {
        let frame = self.frame("start_test", name)?;
        frame.run.start_test(name, attrs);
        trace!(test = %attrs.longname, "test started");
        Ok(())
    }

    pub fn end_test(&mut self, name: &str, attrs: &TestAttrs) -> Result<(), ListenerError> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| ListenerError::order("end_test", format!("'{name}' outside of any suite")))?;
        if !frame.run.end_test(name, attrs, &self.variables) {
            return Err(ListenerError::order(
                "end_test",
                format!("'{name}' was never started"),
            ));
        }
        frame.strategy.on_test_end(&mut frame.run, name);
        trace!(test = %attrs.longname, status = ?attrs.status, "test ended");
        Ok(())
    }

    pub fn start_keyword(&mut self, name: &str, attrs: &KeywordAttrs) -> Result<(), ListenerError> {
        let frame = self.frame("start_keyword", name)?;
        frame.run.enter_keyword();
        frame.strategy.on_keyword_start(&mut frame.run, name, attrs);
        Ok(())
    }

    /// Record the keyword; the nesting depth is restored even when the
    /// strategy rejects it.
    pub fn end_keyword(&mut self, name: &str, attrs: &KeywordAttrs) -> Result<(), ListenerError> {
        let frame = self.frames.last_mut().ok_or_else(|| {
            ListenerError::order("end_keyword", format!("'{name}' outside of any suite"))
        })?;
        frame.run.record_keyword(name, attrs, &self.variables);
        let result = frame
            .strategy
            .on_keyword_end(&mut frame.run, name, attrs, &self.variables);
        frame.run.leave_keyword();
        result.map_err(ListenerError::from)
    }

    pub fn message(&mut self, message: &str) {
        trace!(message, "engine message");
    }

    pub fn log_message(&mut self, message: &str) {
        trace!(message, "engine log message");
    }

    /// Render and upload every queued report once the engine output exists.
    ///
    /// Does nothing when a suite disabled uploads with `No Logs Upload`.
    pub fn output_file(&mut self, path: &Path) -> Result<DispatchSummary, ListenerError> {
        let uploads = std::mem::take(&mut self.pending);
        if self.no_logs_upload {
            info!(skipped = uploads.len(), "report uploads disabled");
            return Ok(DispatchSummary::default());
        }
        info!(output = %path.display(), queued = uploads.len(), "dispatching report uploads");
        Ok(self.dispatcher.dispatch(path, uploads)?)
    }

    /// Feed one recorded event.
    ///
    /// Variable snapshots are not handled here; the caller owns the
    /// variable source and applies them itself. Returns the upload summary
    /// for `output_file` events.
    pub fn handle(&mut self, event: &ListenerEvent) -> Result<Option<DispatchSummary>, ListenerError> {
        match event {
            ListenerEvent::StartSuite { name, attrs } => self.start_suite(name, attrs),
            ListenerEvent::EndSuite { name, attrs } => self.end_suite(name, attrs)?,
            ListenerEvent::StartTest { name, attrs } => self.start_test(name, attrs)?,
            ListenerEvent::EndTest { name, attrs } => self.end_test(name, attrs)?,
            ListenerEvent::StartKeyword { name, attrs } => self.start_keyword(name, attrs)?,
            ListenerEvent::EndKeyword { name, attrs } => self.end_keyword(name, attrs)?,
            ListenerEvent::Message { message } => self.message(message),
            ListenerEvent::LogMessage { message } => self.log_message(message),
            ListenerEvent::Variables { .. } => {}
            ListenerEvent::OutputFile { path } => {
                return self.output_file(Path::new(path)).map(Some);
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::KeywordKind;
    use crate::mock_tracker::MockTracker;
    use crate::variables::MapVariables;

    fn settings() -> Arc<Settings> {
        let mut settings = Settings::default();
        settings.tracker.custom_field_id = "10100".into();
        settings.tracker.project_key = "TP".into();
        Arc::new(settings)
    }

    fn suite(longname: &str, source: &str, metadata: &[(&str, &str)]) -> SuiteAttrs {
        SuiteAttrs {
            longname: longname.into(),
            source: Some(source.into()),
            metadata: metadata
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            ..SuiteAttrs::default()
        }
    }

    fn test(longname: &str, status: Option<&str>) -> TestAttrs {
        TestAttrs {
            longname: longname.into(),
            status: status.map(str::to_string),
            ..TestAttrs::default()
        }
    }

    fn listener(tracker: &Arc<MockTracker>) -> Listener<MapVariables> {
        Listener::new(tracker.client(), settings(), MapVariables::new())
    }

    #[test]
    fn test_phases_follow_suite_nesting() {
        let tracker = MockTracker::new();
        let mut listener = listener(&tracker);
        assert_eq!(listener.phase(), Phase::Idle);

        listener.start_suite("Root", &suite("Root", "/ts", &[]));
        listener.start_suite("Child", &suite("Root.Child", "/ts/child.robot", &[]));
        assert_eq!(listener.phase(), Phase::Collecting);
        assert_eq!(listener.depth(), 2);

        listener.end_suite("Child", &SuiteAttrs::default()).unwrap();
        assert_eq!(listener.phase(), Phase::Collecting);
        listener.end_suite("Root", &SuiteAttrs::default()).unwrap();
        assert_eq!(listener.phase(), Phase::Idle);
        assert!(tracker.requests().is_empty());
    }

    #[test]
    fn test_granularity_inherits_and_resets() {
        let tracker = MockTracker::new();
        let mut listener = listener(&tracker);

        listener.start_suite("Root", &suite("Root", "/ts", &[("Issue Per", "Test Case")]));
        listener.start_suite("A", &suite("Root.A", "/ts/a.robot", &[]));
        assert_eq!(
            listener.frames.last().unwrap().record.granularity,
            Granularity::TestCase
        );
        listener.end_suite("A", &SuiteAttrs::default()).unwrap();
        listener.end_suite("Root", &SuiteAttrs::default()).unwrap();

        listener.start_suite("Other", &suite("Other", "/other", &[("Issue Per", "Per Keyword")]));
        assert_eq!(
            listener.frames.last().unwrap().record.granularity,
            Granularity::TestSuite
        );
    }

    #[test]
    fn test_event_order_violations() {
        let tracker = MockTracker::new();
        let mut listener = listener(&tracker);

        let err = listener.start_test("T", &test("Root.T", None)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ListenerEventOrder);
        let err = listener.end_suite("Root", &SuiteAttrs::default()).unwrap_err();
        assert!(matches!(err, ListenerError::EventOrder { event: "end_suite", .. }));

        listener.start_suite("Root", &suite("Root", "/ts", &[]));
        let err = listener.end_test("Ghost", &test("Root.Ghost", None)).unwrap_err();
        assert!(err.to_string().contains("never started"));
    }

    #[test]
    fn test_end_keyword_restores_depth_on_usage_error() {
        let tracker = MockTracker::new();
        let mut listener = listener(&tracker);
        listener.start_suite("Root", &suite("Root", "/ts", &[("Issue Per", "Data Item")]));
        listener.start_test("T", &test("Root.T", None)).unwrap();

        let outer = KeywordAttrs::new(KeywordKind::Other);
        let item = KeywordAttrs::new(KeywordKind::TestForItem).with_status("PASS");
        listener.start_keyword("FOR", &outer).unwrap();
        listener.start_keyword("item", &item).unwrap();
        let err = listener.end_keyword("item", &item).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ListenerMissingScenarioName);
        assert_eq!(listener.frames.last().unwrap().run.depth(), 1);
    }

    #[test]
    fn test_no_logs_upload_is_sticky() {
        let tracker = MockTracker::new();
        let mut listener = listener(&tracker);
        listener.start_suite("A", &suite("A", "/a", &[("No Logs Upload", "True")]));
        listener.end_suite("A", &SuiteAttrs::default()).unwrap();
        listener.start_suite("B", &suite("B", "/b", &[]));
        listener.end_suite("B", &SuiteAttrs::default()).unwrap();
        assert!(listener.uploads_disabled());

        let summary = listener.output_file(Path::new("output.xml")).unwrap();
        assert_eq!(summary.attempted(), 0);
    }

    #[test]
    fn test_suite_source_fallback() {
        let attrs = SuiteAttrs {
            longname: "Root.Api.Login".into(),
            ..SuiteAttrs::default()
        };
        assert_eq!(suite_source(&attrs), "/Root/Api/Login");
    }
}
