//! Test tag directives.
//!
//! Tags attached to a test can steer how it is reported:
//!
//! | Tag              | Effect                                            |
//! |------------------|---------------------------------------------------|
//! | `BasedOn:<key>`  | link the test issue to `<key>` ("Relates")        |
//! | `Issue:<key>`    | report into the existing issue `<key>`            |
//! | `Bug:<key>`      | link to a bug; repeatable                         |
//! | `Ignore`         | report the whole test as unexecuted               |
//! | `Ignore:<name>`  | report the step or item named `<name>` unexecuted |
//! | `Draft`          | like `Ignore`; the test is not reported at all    |
//!
//! Prefixes are matched case-insensitively and ignoring spaces; values keep
//! their case.

use serde::{Deserialize, Serialize};

/// Scope of an `Ignore` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoreScope {
    /// The whole test (or suite item) is ignored.
    WholeTest,
    /// Only the item whose long name equals this value is ignored.
    Named(String),
}

/// Directives extracted from a test's tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directives {
    pub based_on: Option<String>,
    pub issue: Option<String>,
    pub bugs: Vec<String>,
    pub ignore: Vec<IgnoreScope>,
    pub draft: bool,
}

impl Directives {
    /// True if an item with `longname` is excluded from status reporting.
    pub fn ignores(&self, longname: &str) -> bool {
        self.ignore.iter().any(|scope| match scope {
            IgnoreScope::WholeTest => true,
            IgnoreScope::Named(name) => name == longname,
        })
    }

    /// True if the whole test is excluded (draft or a bare `Ignore`).
    pub fn ignores_whole_test(&self) -> bool {
        self.draft || self.ignore.contains(&IgnoreScope::WholeTest)
    }
}

/// Parse directives out of a set of free-text tags.
pub fn parse_tags<S: AsRef<str>>(tags: &[S]) -> Directives {
    let mut directives = Directives::default();

    for tag in tags {
        let tag = tag.as_ref();
        let (prefix, value) = match tag.split_once(':') {
            Some((prefix, value)) => (prefix, Some(value)),
            None => (tag, None),
        };
        let prefix: String = prefix
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();

        match (prefix.as_str(), value) {
            ("BASEDON", Some(value)) => directives.based_on = Some(value.trim().to_string()),
            ("ISSUE", Some(value)) => directives.issue = Some(value.trim().to_string()),
            ("BUG", Some(value)) => directives.bugs.push(value.trim().to_string()),
            ("IGNORE", Some(value)) => directives
                .ignore
                .push(IgnoreScope::Named(value.trim().to_string())),
            ("IGNORE", None) => directives.ignore.push(IgnoreScope::WholeTest),
            ("DRAFT", None) => {
                directives.draft = true;
                directives.ignore.push(IgnoreScope::WholeTest);
            }
            _ => {}
        }
    }

    directives
}
