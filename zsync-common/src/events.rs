//! Lifecycle event definitions.
//!
//! Defines the attributes the test-execution engine passes with each
//! listener callback, and the JSON-lines form used to record and replay them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attributes passed with `start_suite` / `end_suite`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteAttrs {
    /// Fully qualified suite name (e.g. `Root.Api.Login`).
    pub longname: String,
    /// Suite file or directory; absent for virtual suites.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub doc: String,
    /// Metadata declared by the suite itself (not inherited).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Final status; only present on `end_suite`.
    #[serde(default)]
    pub status: Option<String>,
    /// Statistics message; only present on `end_suite`.
    #[serde(default)]
    pub statistics: Option<String>,
}

/// Attributes passed with `start_test` / `end_test`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestAttrs {
    pub longname: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub doc: String,
    /// Template keyword name for templated tests.
    #[serde(default)]
    pub template: Option<String>,
    /// Final status; only present on `end_test`.
    #[serde(default)]
    pub status: Option<String>,
    /// Failure or status message; only present on `end_test`.
    #[serde(default)]
    pub message: Option<String>,
}

/// Keyword classification reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeywordKind {
    Keyword,
    #[serde(rename = "Test Setup")]
    TestSetup,
    #[serde(rename = "Test Teardown")]
    TestTeardown,
    #[serde(rename = "Suite Setup")]
    SuiteSetup,
    #[serde(rename = "Suite Teardown")]
    SuiteTeardown,
    #[serde(rename = "Test Foritem")]
    TestForItem,
    /// Any other construct (`Test For`, `Setup`, ...); never recorded.
    #[serde(other)]
    Other,
}

impl KeywordKind {
    /// Kinds recorded as steps when observed directly below a test or suite.
    pub const fn is_top_level_step(self) -> bool {
        matches!(
            self,
            Self::Keyword
                | Self::TestSetup
                | Self::TestTeardown
                | Self::SuiteSetup
                | Self::SuiteTeardown
        )
    }
}

/// Attributes passed with `start_keyword` / `end_keyword`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordAttrs {
    #[serde(rename = "type")]
    pub kind: KeywordKind,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub doc: String,
    /// Final status; only present on `end_keyword`.
    #[serde(default)]
    pub status: Option<String>,
}

impl KeywordAttrs {
    pub fn new(kind: KeywordKind) -> Self {
        Self {
            kind,
            args: Vec::new(),
            doc: String::new(),
            status: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }
}

/// One recorded callback, as stored in a JSON-lines event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ListenerEvent {
    StartSuite { name: String, attrs: SuiteAttrs },
    EndSuite { name: String, attrs: SuiteAttrs },
    StartTest { name: String, attrs: TestAttrs },
    EndTest { name: String, attrs: TestAttrs },
    StartKeyword { name: String, attrs: KeywordAttrs },
    EndKeyword { name: String, attrs: KeywordAttrs },
    Message { message: String },
    LogMessage { message: String },
    /// Snapshot of engine variables set since the previous event.
    Variables {
        values: BTreeMap<String, serde_json::Value>,
    },
    OutputFile { path: String },
}
