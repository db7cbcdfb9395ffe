//! Counter selection and report configuration
//!
//! Counters are selected by name, either from the `STOPWATCH_EVENTS`
//! environment variable (comma-separated), from a TOML file, or from a list
//! supplied by the caller. Names are resolved against the counter source at
//! init time; an empty selection means "use the source's defaults".
//!
//! # Example
//! ```
//! use stopwatch::config::StopwatchConfig;
//!
//! let config = StopwatchConfig::from_toml_str(r#"
//!     events = ["SW_USER_USEC", "SW_MINOR_FAULTS"]
//!     indent_spacing = 2
//! "#).unwrap();
//! assert_eq!(config.events.len(), 2);
//! assert_eq!(config.indent_spacing, 2);
//! ```

use crate::counter_source::{CounterKind, CounterSource};
use crate::error::{Result, StopwatchError};
use crate::store::MAX_COUNTERS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the counter selection
pub const EVENTS_ENV_VAR: &str = "STOPWATCH_EVENTS";

/// Spaces per indentation level in the text report
pub const DEFAULT_INDENT_SPACING: usize = 4;

const EVENT_DELIMITER: char = ',';

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopwatchConfig {
    /// Counter names in registration order; empty selects the source defaults
    pub events: Vec<String>,

    /// Spaces per indentation level in the text report
    ///
    /// Default: 4
    pub indent_spacing: usize,

    /// Where to export CSV results, if anywhere
    pub csv_path: Option<PathBuf>,
}

impl Default for StopwatchConfig {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            indent_spacing: DEFAULT_INDENT_SPACING,
            csv_path: None,
        }
    }
}

/// Split a delimiter-separated counter list, dropping empty entries
pub fn parse_event_list(list: &str) -> Vec<String> {
    list.split(EVENT_DELIMITER)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

impl StopwatchConfig {
    /// Defaults, with counters taken from `STOPWATCH_EVENTS` when set
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(list) = std::env::var(EVENTS_ENV_VAR) {
            tracing::debug!("{} = {:?}", EVENTS_ENV_VAR, list);
            config.events = parse_event_list(&list);
        }
        config
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| StopwatchError::Config(e.to_string()))
    }

    /// Load a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StopwatchError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Replace the counter selection with a delimiter-separated list
    pub fn with_events(mut self, list: &str) -> Self {
        self.events = parse_event_list(list);
        self
    }

    /// Check limits that do not depend on the counter source
    pub fn validate(&self) -> Result<()> {
        if self.events.len() > MAX_COUNTERS {
            return Err(StopwatchError::TooManyCounters {
                requested: self.events.len(),
                max: MAX_COUNTERS,
            });
        }

        if self.indent_spacing > 16 {
            return Err(StopwatchError::Config(format!(
                "indent_spacing must be <= 16, got {}",
                self.indent_spacing
            )));
        }

        Ok(())
    }

    /// Resolve the selected names against `source`
    ///
    /// Unknown names, and names the source cannot count, fail with
    /// `InvalidCounter`.
    pub fn resolve_counters<S: CounterSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<Vec<CounterKind>> {
        if self.events.is_empty() {
            return Ok(source.default_counters());
        }

        self.events
            .iter()
            .map(|name| {
                source
                    .resolve(name)
                    .ok_or_else(|| StopwatchError::InvalidCounter(name.clone()))
            })
            .collect()
    }
}
