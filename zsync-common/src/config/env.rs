//! Environment variable parsing with type safety.
//!
//! Every getter returns `None` when the variable is unset so callers can
//! layer environment overrides on top of file settings. Invalid values are
//! collected instead of failing fast, so all problems are reported at once.

use crate::strategy::Granularity;
use std::env;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

/// Type-safe environment variable parser.
///
/// Collects errors during parsing so all issues can be reported at once.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Create a new parser with the ZSYNC_ prefix.
    pub fn new() -> Self {
        Self::with_prefix("ZSYNC_")
    }

    pub fn with_prefix(prefix: &'static str) -> Self {
        Self {
            prefix,
            errors: Vec::new(),
        }
    }

    /// Get all accumulated errors.
    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    /// Check if any errors occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Take ownership of errors.
    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    /// Get the full variable name with prefix.
    pub fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn raw(&self, name: &str) -> Option<(String, String)> {
        let var_name = self.var_name(name);
        env::var(&var_name).ok().map(|value| (var_name, value))
    }

    /// Get a string value. Empty values count as unset.
    pub fn get_string(&mut self, name: &str) -> Option<String> {
        self.raw(name)
            .map(|(_, value)| value)
            .filter(|value| !value.is_empty())
    }

    /// Get a string value, keeping an explicitly empty one.
    ///
    /// Used for secrets where an empty override is meaningful.
    pub fn get_raw_string(&mut self, name: &str) -> Option<String> {
        self.raw(name).map(|(_, value)| value)
    }

    /// Get a boolean value.
    ///
    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off, "" (for false)
    pub fn get_bool(&mut self, name: &str) -> Option<bool> {
        let (var, value) = self.raw(name)?;
        match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" | "" => Some(false),
            _ => {
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: "boolean (true/false/1/0/yes/no)".to_string(),
                    value,
                });
                None
            }
        }
    }

    /// Get a u32 value with range validation.
    pub fn get_u32_range(&mut self, name: &str, min: u32, max: u32) -> Option<u32> {
        let (var, value) = self.raw(name)?;
        match value.trim().parse::<u32>() {
            Ok(n) if (min..=max).contains(&n) => Some(n),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                None
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: "unsigned 32-bit integer".to_string(),
                    value,
                });
                None
            }
        }
    }

    /// Get a u64 value with range validation.
    pub fn get_u64_range(&mut self, name: &str, min: u64, max: u64) -> Option<u64> {
        let (var, value) = self.raw(name)?;
        match value.trim().parse::<u64>() {
            Ok(n) if (min..=max).contains(&n) => Some(n),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                None
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: "unsigned 64-bit integer".to_string(),
                    value,
                });
                None
            }
        }
    }

    /// Get an `Issue Per` granularity.
    pub fn get_granularity(&mut self, name: &str) -> Option<Granularity> {
        let (var, value) = self.raw(name)?;
        match Granularity::parse(&value) {
            Some(granularity) => Some(granularity),
            None => {
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: "one of 'Test Suite', 'Test Case', 'Data Item'".to_string(),
                    value,
                });
                None
            }
        }
    }

    /// Get a log level value with validation.
    pub fn get_log_level(&mut self, name: &str) -> Option<String> {
        let (var, value) = self.raw(name)?;
        let lower = value.to_lowercase();
        match lower.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" | "off" => Some(lower),
            _ => {
                self.errors.push(EnvError::InvalidLogLevel { var, value });
                None
            }
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn cleanup_env(vars: &[&str]) {
        for var in vars {
            // SAFETY: env tests are serialized
            unsafe { env::remove_var(var) };
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: env tests are serialized
        unsafe { env::set_var(key, value) };
    }

    #[test]
    #[serial]
    fn test_get_bool_true_values() {
        let vars = ["ZSYNC_TEST_BOOL_TRUE"];
        cleanup_env(&vars);

        for val in &["1", "true", "yes", "on", "TRUE", "Yes"] {
            set_env("ZSYNC_TEST_BOOL_TRUE", val);
            let mut parser = EnvParser::new();
            assert_eq!(parser.get_bool("TEST_BOOL_TRUE"), Some(true), "value '{val}'");
            assert!(!parser.has_errors());
        }

        cleanup_env(&vars);
    }

    #[test]
    #[serial]
    fn test_get_bool_invalid_collects_error() {
        let vars = ["ZSYNC_TEST_BOOL_BAD"];
        set_env("ZSYNC_TEST_BOOL_BAD", "maybe");

        let mut parser = EnvParser::new();
        assert_eq!(parser.get_bool("TEST_BOOL_BAD"), None);
        assert!(matches!(
            parser.errors(),
            [EnvError::InvalidValue { var, .. }] if var == "ZSYNC_TEST_BOOL_BAD"
        ));

        cleanup_env(&vars);
    }

    #[test]
    #[serial]
    fn test_unset_values_are_none() {
        let vars = ["ZSYNC_TEST_UNSET"];
        cleanup_env(&vars);

        let mut parser = EnvParser::new();
        assert_eq!(parser.get_string("TEST_UNSET"), None);
        assert_eq!(parser.get_u64_range("TEST_UNSET", 1, 10), None);
        assert_eq!(parser.get_granularity("TEST_UNSET"), None);
        assert!(!parser.has_errors());
    }

    #[test]
    #[serial]
    fn test_range_and_parse_errors_are_all_collected() {
        let vars = ["ZSYNC_TEST_RANGE", "ZSYNC_TEST_NUMBER", "ZSYNC_TEST_LEVEL"];
        set_env("ZSYNC_TEST_RANGE", "0");
        set_env("ZSYNC_TEST_NUMBER", "many");
        set_env("ZSYNC_TEST_LEVEL", "loud");

        let mut parser = EnvParser::new();
        assert_eq!(parser.get_u32_range("TEST_RANGE", 1, 64), None);
        assert_eq!(parser.get_u64_range("TEST_NUMBER", 1, 64), None);
        assert_eq!(parser.get_log_level("TEST_LEVEL"), None);

        let errors = parser.take_errors();
        assert_eq!(errors.len(), 3);
        assert!(matches!(&errors[0], EnvError::OutOfRange { min, .. } if min == "1"));
        assert!(matches!(&errors[1], EnvError::InvalidValue { .. }));
        assert!(matches!(&errors[2], EnvError::InvalidLogLevel { .. }));
        assert!(!parser.has_errors());

        cleanup_env(&vars);
    }

    #[test]
    #[serial]
    fn test_granularity_and_empty_string() {
        let vars = ["ZSYNC_TEST_GRAIN", "ZSYNC_TEST_EMPTY"];
        set_env("ZSYNC_TEST_GRAIN", "Data Item");
        set_env("ZSYNC_TEST_EMPTY", "");

        let mut parser = EnvParser::new();
        assert_eq!(parser.get_granularity("TEST_GRAIN"), Some(Granularity::DataItem));
        assert_eq!(parser.get_string("TEST_EMPTY"), None);
        assert_eq!(parser.get_raw_string("TEST_EMPTY"), Some(String::new()));

        cleanup_env(&vars);
    }
}
