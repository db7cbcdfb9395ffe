//! Report generation
//!
//! Turns the current contents of a [`MeasurementStore`] into rows ordered by
//! the reconstructed call tree, then renders them as a text table, CSV or
//! JSON. The tree is built and dropped inside [`Report::from_store`]; the
//! report itself holds plain values only.

use crate::call_tree::CallTree;
use crate::counter_source::CounterSource;
use crate::csv_output::{CsvOutput, CsvRoutine};
use crate::error::Result;
use crate::json_output::{JsonOutput, JsonRoutine};
use crate::store::{MeasurementStore, ROOT_ROUTINE_ID};
use crate::table::StringTable;
use std::path::Path;

const TABLE_HEADERS: [&str; 4] = ["ID", "NAME", "TIMES CALLED", "TOTAL REAL MICROSECONDS"];
const NAME_COLUMN: usize = 1;

/// One invoked routine, positioned in the call tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub id: usize,
    pub name: String,
    pub caller_id: usize,
    /// Depth below the root; callees of the root have depth 0
    pub depth: usize,
    pub times_called: u64,
    pub total_real_us: i64,
    /// Accumulated counters, in registration order
    pub counters: Vec<i64>,
}

/// Snapshot of every invoked routine in call-tree pre-order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    counter_names: Vec<String>,
    rows: Vec<ReportRow>,
}

impl Report {
    /// Build a report from the routines that completed at least one interval
    ///
    /// Fails with `DanglingCaller` when an invoked routine's caller never
    /// completed an interval itself.
    pub fn from_store<S: CounterSource>(store: &MeasurementStore<S>) -> Result<Self> {
        let edges = store.edges();
        let tree = CallTree::build(&edges)?;

        let mut rows = Vec::with_capacity(edges.len());
        for node in tree.iter() {
            if node.function_id == ROOT_ROUTINE_ID {
                continue;
            }
            let record = store.get(node.function_id)?;
            rows.push(ReportRow {
                id: record.id,
                name: record.name.unwrap_or_default(),
                caller_id: record.caller_id.unwrap_or(ROOT_ROUTINE_ID),
                // Depth relative to main, which sits at depth 0
                depth: node.stack_depth - 1,
                times_called: record.times_called,
                total_real_us: record.total_real_us,
                counters: record.counters,
            });
        }

        tracing::debug!("report built with {} routine(s)", rows.len());
        Ok(Self {
            counter_names: store.counters().iter().map(|k| k.name().to_string()).collect(),
            rows,
        })
    }

    /// Rows in call-tree pre-order
    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    /// Counter column names
    pub fn counter_names(&self) -> &[String] {
        &self.counter_names
    }

    /// Lay the report out as a table, indenting names by call depth
    pub fn to_table(&self, indent_spacing: usize) -> Result<StringTable> {
        let columns = TABLE_HEADERS.len() + self.counter_names.len();
        let mut table = StringTable::new(columns, self.rows.len() + 1, true, indent_spacing);

        let headers = TABLE_HEADERS
            .iter()
            .copied()
            .chain(self.counter_names.iter().map(String::as_str));
        for (col, header) in headers.enumerate() {
            table.set_cell(header, 0, col)?;
        }

        for (idx, row) in self.rows.iter().enumerate() {
            let line = idx + 1;
            table.set_cell(&row.id.to_string(), line, 0)?;
            table.set_cell(&row.name, line, NAME_COLUMN)?;
            table.set_indent(row.depth, line, NAME_COLUMN)?;
            table.set_cell(&row.times_called.to_string(), line, 2)?;
            table.set_cell_int(row.total_real_us, line, 3)?;
            for (offset, value) in row.counters.iter().enumerate() {
                table.set_cell_int(*value, line, TABLE_HEADERS.len() + offset)?;
            }
        }

        Ok(table)
    }

    /// Render the text table
    pub fn render_table(&self, indent_spacing: usize) -> Result<String> {
        Ok(self.to_table(indent_spacing)?.render())
    }

    fn csv_output(&self) -> CsvOutput {
        let mut output = CsvOutput::new(self.counter_names.clone());
        for row in &self.rows {
            output.add_routine(CsvRoutine {
                id: row.id,
                name: row.name.clone(),
                caller_id: row.caller_id,
                times_called: row.times_called,
                total_real_us: row.total_real_us,
                counters: row.counters.clone(),
            });
        }
        output
    }

    /// CSV document, rows in ascending id order
    pub fn to_csv(&self) -> String {
        self.csv_output().to_csv()
    }

    /// Write the CSV document to `path`
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        self.csv_output().write_to(path)
    }

    /// Pretty-printed JSON document
    pub fn to_json(&self) -> Result<String> {
        let mut output = JsonOutput::new(self.counter_names.clone());
        for row in &self.rows {
            output.add_routine(JsonRoutine {
                id: row.id,
                name: row.name.clone(),
                caller_id: row.caller_id,
                depth: row.depth,
                times_called: row.times_called,
                total_real_us: row.total_real_us,
                counters: self
                    .counter_names
                    .iter()
                    .cloned()
                    .zip(row.counters.iter().copied())
                    .collect(),
            });
        }
        Ok(output.to_json()?)
    }
}
