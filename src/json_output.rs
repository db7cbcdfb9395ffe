//! JSON output format for routine measurements
//!
//! Mirrors the text report: routines in call-tree pre-order with their
//! depth below the root, plus the counter names in registration order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single routine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRoutine {
    pub id: usize,
    pub name: String,
    pub caller_id: usize,
    /// Depth below the root (direct callees of the root have depth 0)
    pub depth: usize,
    pub times_called: u64,
    pub total_real_us: i64,
    /// Counter name -> accumulated value
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub counters: BTreeMap<String, i64>,
}

/// Complete report document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonOutput {
    pub version: String,
    /// Counter names in registration order
    pub counters: Vec<String>,
    pub routines: Vec<JsonRoutine>,
}

impl JsonOutput {
    pub fn new(counters: Vec<String>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            counters,
            routines: Vec::new(),
        }
    }

    pub fn add_routine(&mut self, routine: JsonRoutine) {
        self.routines.push(routine);
    }

    /// Serialize to a pretty-printed JSON string
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
