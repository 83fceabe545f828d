//! Access to the test engine's variables.
//!
//! The engine publishes result details through well-known variables, for
//! example `<test>_EXPECTED_RESULT`, `<test>_SCENARIO_NAME`, `TEST_TAGS` or
//! `ATTACHMENT_PATHS`. Names are used bare: `${X}`, `@{X}` and `&{X}` all
//! refer to `X`.

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

/// Well-known variable names.
pub mod names {
    pub const TEST_TAGS: &str = "TEST_TAGS";
    pub const ATTACHMENT_PATHS: &str = "ATTACHMENT_PATHS";
    pub const KEYWORD_MESSAGE: &str = "KEYWORD_MESSAGE";
    pub const SUITE_NAME: &str = "SUITE NAME";

    pub fn expected_result(test: &str) -> String {
        format!("{test}_EXPECTED_RESULT")
    }

    pub fn test_data(test: &str) -> String {
        format!("{test}_TEST_DATA")
    }

    pub fn scenario_name(test: &str) -> String {
        format!("{test}_SCENARIO_NAME")
    }

    pub fn issue_key(test: &str) -> String {
        format!("{test}_ISSUE_KEY")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VariableError {
    #[error("Variable '{0}' not found")]
    NotFound(String),
}

/// Variable lookup service supplied by the test engine.
pub trait Variables {
    /// Raw value of a variable.
    fn get(&self, name: &str) -> Option<Value>;

    /// String value of a variable; scalars are stringified, lists joined.
    fn get_str(&self, name: &str) -> Option<String> {
        self.get(name).and_then(|value| value_to_string(&value))
    }

    /// List value of a variable; a scalar becomes a one-item list.
    fn get_list(&self, name: &str) -> Option<Vec<String>> {
        match self.get(name)? {
            Value::Array(items) => Some(items.iter().filter_map(value_to_string).collect()),
            Value::Null => None,
            other => value_to_string(&other).map(|s| vec![s]),
        }
    }

    /// Replace `${name}` references in `text`.
    fn replace_variables(&self, text: &str) -> Result<String, VariableError> {
        let mut missing = None;
        let replaced = reference_pattern().replace_all(text, |caps: &regex::Captures<'_>| {
            match self.get_str(&caps[1]) {
                Some(value) => value,
                None => {
                    missing.get_or_insert_with(|| caps[1].to_string());
                    caps[0].to_string()
                }
            }
        });
        match missing {
            Some(name) => Err(VariableError::NotFound(name)),
            None => Ok(replaced.into_owned()),
        }
    }
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid variable pattern"))
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(value_to_string)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        other => Some(other.to_string()),
    }
}

/// Strip `${...}`, `@{...}` or `&{...}` decoration from a variable name.
pub fn bare_name(name: &str) -> &str {
    let trimmed = name.trim();
    for sigil in ["${", "@{", "&{"] {
        if let Some(inner) = trimmed.strip_prefix(sigil).and_then(|n| n.strip_suffix('}')) {
            return inner;
        }
    }
    trimmed
}

/// In-memory variable scope, updated by the replay host or by tests.
#[derive(Debug, Clone, Default)]
pub struct MapVariables {
    values: BTreeMap<String, Value>,
}

impl MapVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(bare_name(name).to_string(), value.into());
    }

    pub fn remove(&mut self, name: &str) {
        self.values.remove(bare_name(name));
    }

    pub fn extend(&mut self, values: BTreeMap<String, Value>) {
        for (name, value) in values {
            if value.is_null() {
                self.remove(&name);
            } else {
                self.set(&name, value);
            }
        }
    }
}

impl Variables for MapVariables {
    fn get(&self, name: &str) -> Option<Value> {
        self.values.get(bare_name(name)).cloned()
    }
}
