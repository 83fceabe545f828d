//! Shared helpers for zsync CLI tests.

use std::path::Path;
use std::process::{Command, Output};

/// Variables that would leak the caller's configuration into a test run.
const INHERITED_VARS: &[&str] = &[
    "ZSYNC_CONFIG",
    "ZSYNC_TRACKER_URL",
    "ZSYNC_TRACKER_USER",
    "ZSYNC_TRACKER_PASSWORD",
    "ZSYNC_CUSTOM_FIELD_ID",
    "ZSYNC_PROJECT_KEY",
    "ZSYNC_ISSUE_PER",
    "ZSYNC_SUITE_ROOT",
    "ZSYNC_RENDERER",
    "ZSYNC_REPORT_WORKERS",
    "ZSYNC_HTTP_TIMEOUT_SECS",
    "ZSYNC_LOG_LEVEL",
    "ZSYNC_LOG_FORMAT",
    "ZSYNC_LOG_FILE",
    "RUST_LOG",
];

pub const VALID_CONFIG: &str = r#"
[tracker]
base_url = "https://jira.example.com"
user = "bot"
password = "hunter2"
custom_field_id = "10100"
project_key = "DEMO"

[reports]
workers = 2
"#;

/// Run the zsync binary with a clean environment in `dir`.
pub fn zsync(dir: &Path, args: &[&str]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_zsync"));
    command.current_dir(dir).args(args);
    for var in INHERITED_VARS {
        command.env_remove(var);
    }
    command.output().expect("failed to run zsync binary")
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
