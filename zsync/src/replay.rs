//! Event-log replay.
//!
//! Reads a JSON-lines recording of engine callbacks and feeds it through a
//! [`Listener`] backed by the real tracker. Variable snapshots in the log
//! update the listener's variable scope before the next callback.

use anyhow::{Context, Result, bail};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use zsync_common::{
    Credentials, DispatchSummary, ErrorCode, Listener, ListenerError, ListenerEvent, MapVariables,
    Settings, TrackerClient, UreqTransport,
};

/// One parsed line of an event log.
#[derive(Debug)]
pub struct RecordedEvent {
    pub line: usize,
    pub event: ListenerEvent,
}

/// Parse an event log. Blank lines and `#` comments are skipped.
pub fn parse_events(text: &str) -> Result<Vec<RecordedEvent>> {
    let mut events = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<ListenerEvent>(line) {
            Ok(event) => events.push(RecordedEvent {
                line: index + 1,
                event,
            }),
            Err(err) => bail!(
                "[{}] invalid event on line {}: {}",
                ErrorCode::ListenerEventParse.code_string(),
                index + 1,
                err
            ),
        }
    }
    Ok(events)
}

pub fn read_events(path: &Path) -> Result<Vec<RecordedEvent>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read event log {}", path.display()))?;
    parse_events(&text)
}

/// Outcome of a replay.
#[derive(Debug, Default)]
pub struct ReplayReport {
    pub events: usize,
    /// Callback failures as `(line, error)`; replay continues past them.
    pub failures: Vec<(usize, ListenerError)>,
    pub uploads: Option<DispatchSummary>,
}

impl ReplayReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.uploads.as_ref().is_none_or(DispatchSummary::is_clean)
    }
}

/// Drive `listener` with `events`.
pub fn replay(listener: &mut Listener<MapVariables>, events: Vec<RecordedEvent>) -> ReplayReport {
    let mut report = ReplayReport::default();
    for RecordedEvent { line, event } in events {
        report.events += 1;
        if let ListenerEvent::Variables { values } = event {
            listener.variables_mut().extend(values);
            continue;
        }
        match listener.handle(&event) {
            Ok(Some(summary)) => report.uploads = Some(summary),
            Ok(None) => {}
            Err(err) => {
                error!(line, code = %err.code().code_string(), error = %err, "event failed");
                report.failures.push((line, err));
            }
        }
    }
    report
}

/// Load settings, connect to the tracker and replay the log at `events`.
pub fn run(events: &Path, config: Option<&Path>) -> Result<ReplayReport> {
    let settings = Settings::load_validated(config)
        .map_err(|err| anyhow::anyhow!("[{}] {err}", err.code().code_string()))?;
    let recorded = read_events(events)?;
    info!(
        events = recorded.len(),
        tracker = %settings.tracker.base_url,
        "replaying event log"
    );

    let credentials = Credentials::new(
        &settings.tracker.base_url,
        &settings.tracker.user,
        &settings.tracker.password,
    );
    let transport = Arc::new(UreqTransport::new(settings.http.timeout()));
    let client = TrackerClient::new(credentials, transport);
    let mut listener = Listener::new(client, Arc::new(settings), MapVariables::new());

    Ok(replay(&mut listener, recorded))
}
