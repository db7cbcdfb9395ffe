//! CSV output format for routine measurements
//!
//! One header row followed by one row per invoked routine:
//!
//! ```text
//! ID,NAME,CALLER_ID,TIMES_CALLED,TOTAL_REAL_MICROSECONDS,SW_USER_USEC
//! 1,total-loop,0,1,5120,4980
//! 2,single-cycle,1,10,5002,4875
//! ```
//!
//! Names are short labels without separators, so fields are never quoted.

use crate::counter_source::CounterSource;
use crate::error::{Result, StopwatchError};
use crate::store::{MeasurementStore, ROOT_ROUTINE_ID};
use std::path::Path;

const STATIC_HEADERS: [&str; 5] = [
    "ID",
    "NAME",
    "CALLER_ID",
    "TIMES_CALLED",
    "TOTAL_REAL_MICROSECONDS",
];

/// CSV record for a single routine
#[derive(Debug, Clone)]
pub struct CsvRoutine {
    pub id: usize,
    pub name: String,
    pub caller_id: usize,
    pub times_called: u64,
    pub total_real_us: i64,
    pub counters: Vec<i64>,
}

/// CSV output formatter
#[derive(Debug)]
pub struct CsvOutput {
    counter_names: Vec<String>,
    routines: Vec<CsvRoutine>,
}

impl CsvOutput {
    /// Create a formatter with one extra column per counter name
    pub fn new(counter_names: Vec<String>) -> Self {
        Self {
            counter_names,
            routines: Vec::new(),
        }
    }

    /// Collect every invoked routine straight from the store
    ///
    /// Needs no call hierarchy, so routines whose callers are still open
    /// are exported too.
    pub fn from_store<S: CounterSource>(store: &MeasurementStore<S>) -> Self {
        let mut output = Self::new(
            store
                .counters()
                .iter()
                .map(|kind| kind.name().to_string())
                .collect(),
        );
        for record in store.invoked() {
            output.add_routine(CsvRoutine {
                id: record.id,
                name: record.name.clone().unwrap_or_default(),
                caller_id: record.caller_id.unwrap_or(ROOT_ROUTINE_ID),
                times_called: record.times_called,
                total_real_us: record.total_real_us,
                counters: record.counters.clone(),
            });
        }
        output
    }

    /// Add a routine to the output
    pub fn add_routine(&mut self, routine: CsvRoutine) {
        self.routines.push(routine);
    }

    /// Generate the header row
    fn header(&self) -> String {
        let mut headers: Vec<&str> = STATIC_HEADERS.to_vec();
        headers.extend(self.counter_names.iter().map(String::as_str));
        headers.join(",")
    }

    /// Format a routine as CSV row
    fn format_routine(&self, routine: &CsvRoutine) -> String {
        let mut fields = vec![
            routine.id.to_string(),
            routine.name.clone(),
            routine.caller_id.to_string(),
            routine.times_called.to_string(),
            routine.total_real_us.to_string(),
        ];
        fields.extend(routine.counters.iter().map(i64::to_string));
        fields.join(",")
    }

    /// Generate CSV output as string, rows in ascending id order
    pub fn to_csv(&self) -> String {
        let mut output = String::new();

        output.push_str(&self.header());
        output.push('\n');

        let mut rows: Vec<&CsvRoutine> = self.routines.iter().collect();
        rows.sort_by_key(|routine| routine.id);
        for routine in rows {
            output.push_str(&self.format_routine(routine));
            output.push('\n');
        }

        output
    }

    /// Write the CSV document to `path`, replacing any existing file
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_csv()).map_err(|source| StopwatchError::InvalidFile {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("wrote {} routine(s) to {}", self.routines.len(), path.display());
        Ok(())
    }
}
