//! Error taxonomy for the measurement engine
//!
//! Every fallible operation in the library returns [`Result`]. Errors are
//! surfaced to the immediate caller; nothing is retried internally.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the store, the call tree builder, the table renderer
/// and the exporters
#[derive(Debug, Error)]
pub enum StopwatchError {
    #[error("Stopwatch is already initialized")]
    AlreadyInitialized,

    #[error("Stopwatch is not initialized")]
    NotInitialized,

    #[error("Too many counters: requested {requested}, at most {max} can be registered")]
    TooManyCounters { requested: usize, max: usize },

    #[error("Invalid counter: {0}")]
    InvalidCounter(String),

    #[error("Unsupported counter combination: {0}")]
    UnsupportedCombination(String),

    #[error("Failed to read counters: {0}")]
    CounterReadError(String),

    #[error("Index {index} out of range (limit {limit})")]
    OutOfRange { index: usize, limit: usize },

    #[error("Routine {function_id} references caller {caller_id} which has no node")]
    DanglingCaller { function_id: usize, caller_id: usize },

    #[error("Routine {0} appears more than once in the call graph")]
    DuplicateRoutine(usize),

    #[error("Call graph contains a cycle: {unreachable} routine(s) unreachable from the root")]
    CyclicCallGraph { unreachable: usize },

    #[error("Call tree iterator is exhausted")]
    IteratorExhausted,

    #[error("Routine {0} has no open measurement interval")]
    NotStarted(usize),

    #[error("Failed to write {}: {source}", path.display())]
    InvalidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the library
pub type Result<T> = std::result::Result<T, StopwatchError>;
