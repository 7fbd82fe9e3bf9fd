//! Shared CLI presentation utilities.
//!
//! Keep this module format-only: no service calls.

pub mod tables;

pub use tables::{format_last_seen, print_separator, truncate_string};
