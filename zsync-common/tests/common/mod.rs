//! Shared helpers for zsync-common integration tests.

#![allow(dead_code)]

pub mod fixtures;
pub mod logging;

pub use fixtures::*;
pub use logging::init_test_logging;
