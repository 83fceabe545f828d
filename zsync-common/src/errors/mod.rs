//! Error catalog for zsync
//!
//! Every failure the tool reports maps to a stable `ZS-Exxx` code with a
//! message and remediation steps.
//!
//! # Error Code Ranges
//!
//! | Range      | Category    | Description                          |
//! |------------|-------------|--------------------------------------|
//! | E001-E099  | Config      | Configuration and setup errors       |
//! | E100-E199  | Transport   | HTTP calls against the tracker       |
//! | E200-E299  | Sync        | Issue/cycle/execution reconciliation |
//! | E300-E399  | Listener    | Lifecycle events and variables       |
//! | E400-E499  | Report      | Report rendering and attachments     |
//! | E500-E599  | Internal    | Internal/unexpected errors           |

pub mod catalog;

pub use catalog::{ErrorCategory, ErrorCode, ErrorEntry};
