//! CLI argument parsing for the stopwatch demo binary

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the measurement report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Indented text table (default)
    Text,
    /// JSON format for machine parsing
    Json,
    /// CSV format for spreadsheet analysis
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "stopwatch")]
#[command(version)]
#[command(
    about = "Per-routine counter and wall-clock profiling of an instrumented matmul loop",
    long_about = None
)]
pub struct Cli {
    /// Matrix dimension
    #[arg(short = 'n', long = "size", value_name = "N", default_value = "200")]
    pub size: usize,

    /// Number of multiplication rounds
    #[arg(
        short = 'i',
        long = "iterations",
        value_name = "COUNT",
        default_value = "10"
    )]
    pub iterations: usize,

    /// Counters to record (e.g., -e SW_USER_USEC,SW_MINOR_FAULTS); overrides STOPWATCH_EVENTS
    #[arg(short = 'e', long = "events", value_name = "LIST")]
    pub events: Option<String>,

    /// Load configuration from a TOML file
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format (text, json or csv)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Also write the CSV report to FILE
    #[arg(long = "csv", value_name = "FILE")]
    pub csv: Option<PathBuf>,

    /// Enable debug tracing on stderr
    #[arg(long = "debug")]
    pub debug: bool,
}
