//! Shared engine for zsync.
//!
//! zsync listens to the lifecycle events of a test-execution engine,
//! accumulates per-test and per-step results, and reconciles them with a
//! Zephyr for Jira instance: issues, test cycles, executions, steps, step
//! results and attachments are created or updated so that repeated runs never
//! duplicate tracker records.
//!
//! The main entry point is [`Listener`]; it is fed the engine callbacks in
//! order and talks to the tracker through a [`TrackerClient`] built on a
//! pluggable [`Transport`].

pub mod accumulator;
pub mod client;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod errors;
pub mod events;
pub mod listener;
pub mod logging;
pub mod mock_tracker;
pub mod strategy;
pub mod tags;
pub mod types;
pub mod util;
pub mod variables;

pub use client::{
    Credentials, EntityType, HttpMethod, HttpRequest, HttpResponse, RequestBody, TrackerClient,
    Transport, TransportError, UreqTransport,
};
pub use config::{ConfigError, ConfigWarning, EnvError, EnvParser, Settings, validate_config};
pub use context::{ContextStore, MetadataTree, Namespace, NodeValue, normalize_path};
pub use dispatcher::{
    CommandRenderer, DispatchError, DispatchSummary, ReportDispatcher, ReportRenderer, UploadFailure,
};
pub use errors::{ErrorCategory, ErrorCode, ErrorEntry};
pub use events::{KeywordAttrs, KeywordKind, ListenerEvent, SuiteAttrs, TestAttrs};
pub use listener::{Listener, ListenerError, Phase};
pub use logging::{LogConfig, LogFormat, LoggingError, LoggingGuards, init_logging};
pub use mock_tracker::MockTracker;
pub use strategy::{Granularity, ReportingStrategy, SyncError, UsageError};
pub use tags::{Directives, IgnoreScope, parse_tags};
pub use types::{ExecutionStatus, PendingUpload, StepResult, SuiteRecord, TestResult};
pub use variables::{MapVariables, Variables};
