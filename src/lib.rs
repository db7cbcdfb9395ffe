//! Stopwatch - per-routine performance counter profiling
//!
//! Code under test brackets regions with `begin`/`end` calls on a
//! [`MeasurementStore`](store::MeasurementStore), which accumulates
//! wall-clock time and counter deltas per routine id. At report time the
//! recorded caller links are rebuilt into a call tree and rendered as an
//! indented text table, CSV or JSON.

pub mod call_tree;
pub mod cli;
pub mod config;
pub mod counter_source;
pub mod csv_output;
pub mod error;
pub mod json_output;
pub mod report;
pub mod store;
pub mod table;
pub mod workload;

pub use error::{Result, StopwatchError};
