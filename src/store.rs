//! Per-routine measurement store
//!
//! Holds one [`RoutineRecord`] per routine id in a fixed-capacity arena and
//! accumulates counter and wall-clock deltas between matching `begin`/`end`
//! calls. Routine id 0 is reserved for the implicit, un-instrumented caller
//! ("main") and acts as the root of the call tree built at report time.
//!
//! Nesting: each record keeps a count of unmatched `begin` calls. Only the
//! outermost `begin` takes a start snapshot and only the outermost `end`
//! accumulates, so a recursive routine is charged for its outermost
//! inclusive interval exactly once while every `end` still counts as a call.

use crate::call_tree::Edge;
use crate::counter_source::{CounterKind, CounterSource};
use crate::error::{Result, StopwatchError};
use std::fmt;

/// Maximum number of distinct routine ids
pub const MAX_ROUTINES: usize = 500;

/// Maximum number of counters that can be selected at once
pub const MAX_COUNTERS: usize = 10;

/// Maximum routine name length in bytes
pub const MAX_ROUTINE_NAME_LEN: usize = 15;

/// Id of the implicit root routine
pub const ROOT_ROUTINE_ID: usize = 0;

/// Accumulated measurements for one routine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutineRecord {
    /// Routine id (index into the store)
    pub id: usize,
    /// Name latched on the first `begin`
    pub name: Option<String>,
    /// Caller latched on the first `begin`
    pub caller_id: Option<usize>,
    /// Number of completed `end` calls
    pub times_called: u64,
    /// Accumulated wall-clock microseconds
    pub total_real_us: i64,
    /// Accumulated counter deltas, in selection order
    pub counters: Vec<i64>,
    start_counters: Vec<i64>,
    start_real_us: i64,
    open_depth: usize,
}

impl RoutineRecord {
    fn empty(id: usize, num_counters: usize) -> Self {
        Self {
            id,
            counters: vec![0; num_counters],
            start_counters: vec![0; num_counters],
            ..Default::default()
        }
    }

    /// Number of `begin` calls not yet matched by an `end`
    pub fn open_depth(&self) -> usize {
        self.open_depth
    }

    /// Whether the routine completed at least one interval
    pub fn was_invoked(&self) -> bool {
        self.times_called > 0
    }
}

/// Report view of a routine, with counter names attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineResult {
    pub id: usize,
    pub name: String,
    pub caller_id: usize,
    pub times_called: u64,
    pub total_real_us: i64,
    pub counters: Vec<(CounterKind, i64)>,
}

impl fmt::Display for RoutineResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Procedure name: {}", self.name)?;
        writeln!(f, "Total times run: {}", self.times_called)?;
        write!(f, "Total real microseconds elapsed: {}", self.total_real_us)?;
        for (kind, value) in &self.counters {
            write!(f, "\n{}: {}", kind, value)?;
        }
        Ok(())
    }
}

/// Fixed-capacity store of routine measurements bound to a counter source
#[derive(Debug)]
pub struct MeasurementStore<S: CounterSource> {
    source: S,
    records: Vec<RoutineRecord>,
    counters: Vec<CounterKind>,
    scratch: Vec<i64>,
    initialized: bool,
}

impl<S: CounterSource> MeasurementStore<S> {
    /// Create an inactive store with room for [`MAX_ROUTINES`] routines
    pub fn new(source: S) -> Self {
        Self::with_capacity(source, MAX_ROUTINES)
    }

    /// Create an inactive store with room for `capacity` routines
    pub fn with_capacity(source: S, capacity: usize) -> Self {
        Self {
            source,
            records: (0..capacity).map(|id| RoutineRecord::empty(id, 0)).collect(),
            counters: Vec::new(),
            scratch: Vec::new(),
            initialized: false,
        }
    }

    /// Number of routine slots
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Whether `init` succeeded and `destroy` has not been called since
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Counters selected at `init`, in registration order
    pub fn counters(&self) -> &[CounterKind] {
        &self.counters
    }

    /// The bound counter source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Reset every record, bind the source to `counters` and start counting
    ///
    /// On failure the source is released before returning.
    pub fn init(&mut self, counters: &[CounterKind]) -> Result<()> {
        if self.initialized {
            return Err(StopwatchError::AlreadyInitialized);
        }

        if counters.len() > MAX_COUNTERS {
            return Err(StopwatchError::TooManyCounters {
                requested: counters.len(),
                max: MAX_COUNTERS,
            });
        }

        for (idx, kind) in counters.iter().enumerate() {
            if counters[..idx].contains(kind) {
                return Err(StopwatchError::UnsupportedCombination(format!(
                    "{} selected more than once",
                    kind
                )));
            }
        }

        let num_counters = counters.len();
        for record in &mut self.records {
            *record = RoutineRecord::empty(record.id, num_counters);
        }
        self.counters = counters.to_vec();
        self.scratch = vec![0; num_counters];

        if let Err(e) = self.source.open(counters) {
            self.teardown();
            return Err(e);
        }

        if let Err(e) = self.source.start() {
            self.teardown();
            return Err(e);
        }

        self.initialized = true;
        tracing::debug!(
            "stopwatch initialized with {} counter(s): {:?}",
            num_counters,
            self.counters
        );
        Ok(())
    }

    /// Initialize with the source's default counter selection
    pub fn init_default(&mut self) -> Result<()> {
        let defaults = self.source.default_counters();
        self.init(&defaults)
    }

    /// Stop and release the counter source
    ///
    /// Teardown always runs; `NotInitialized` is reported afterwards when
    /// the store was not active.
    pub fn destroy(&mut self) -> Result<()> {
        let was_initialized = self.initialized;
        self.teardown();
        if !was_initialized {
            return Err(StopwatchError::NotInitialized);
        }
        tracing::debug!("stopwatch destroyed");
        Ok(())
    }

    fn teardown(&mut self) {
        let mut last = vec![0; self.counters.len()];
        if let Err(e) = self.source.stop(&mut last) {
            if self.initialized {
                tracing::warn!("Failed to stop counter source during teardown: {}", e);
            } else {
                tracing::trace!("counter source was not running: {}", e);
            }
        }
        self.source.close();
        self.initialized = false;
    }

    fn check_active(&self, id: usize) -> Result<()> {
        if !self.initialized {
            return Err(StopwatchError::NotInitialized);
        }
        self.check_range(id)
    }

    fn check_range(&self, id: usize) -> Result<()> {
        if id >= self.records.len() {
            return Err(StopwatchError::OutOfRange {
                index: id,
                limit: self.records.len(),
            });
        }
        Ok(())
    }

    /// Open a measurement interval for `id`
    ///
    /// `name` and `caller_id` are latched on the first `begin` for `id` and
    /// ignored afterwards.
    pub fn begin(&mut self, id: usize, name: &str, caller_id: usize) -> Result<()> {
        self.check_active(id)?;
        self.check_range(caller_id)?;

        let record = &mut self.records[id];
        if record.open_depth == 0 {
            self.source.read(&mut record.start_counters)?;
            record.start_real_us = self.source.now_realtime_us();
        }
        record.open_depth += 1;

        if record.name.is_none() {
            record.name = Some(truncate_name(name));
            record.caller_id = Some(caller_id);
        }

        Ok(())
    }

    /// Close the innermost open interval for `id`
    ///
    /// If reading the counters fails on the outermost `end`, the interval
    /// is closed without accumulating or counting a call.
    pub fn end(&mut self, id: usize) -> Result<()> {
        self.check_active(id)?;

        let record = &mut self.records[id];
        match record.open_depth {
            0 => return Err(StopwatchError::NotStarted(id)),
            1 => {
                // A failed read drops the interval so later pairs start clean
                if let Err(e) = self.source.read(&mut self.scratch) {
                    record.open_depth = 0;
                    tracing::warn!("Routine {} interval discarded: {}", id, e);
                    return Err(e);
                }
                let now = self.source.now_realtime_us();

                record.total_real_us += now - record.start_real_us;
                for ((total, start), current) in record
                    .counters
                    .iter_mut()
                    .zip(&record.start_counters)
                    .zip(&self.scratch)
                {
                    *total += current - start;
                }
            }
            _ => {}
        }

        record.open_depth -= 1;
        record.times_called += 1;
        Ok(())
    }

    /// Run `f` inside a `begin`/`end` pair for `id`
    ///
    /// The closure receives the store so nested routines can be measured.
    pub fn measure<F, R>(&mut self, id: usize, name: &str, caller_id: usize, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> R,
    {
        self.begin(id, name, caller_id)?;
        let result = f(self);
        self.end(id)?;
        Ok(result)
    }

    /// Snapshot of the record at `id`
    pub fn get(&self, id: usize) -> Result<RoutineRecord> {
        self.check_range(id)?;
        Ok(self.records[id].clone())
    }

    /// Report view of the record at `id`
    pub fn result(&self, id: usize) -> Result<RoutineResult> {
        self.check_range(id)?;
        let record = &self.records[id];
        Ok(RoutineResult {
            id,
            name: record.name.clone().unwrap_or_default(),
            caller_id: record.caller_id.unwrap_or(ROOT_ROUTINE_ID),
            times_called: record.times_called,
            total_real_us: record.total_real_us,
            counters: self
                .counters
                .iter()
                .copied()
                .zip(record.counters.iter().copied())
                .collect(),
        })
    }

    /// Records with at least one completed interval, in ascending id order
    pub fn invoked(&self) -> impl Iterator<Item = &RoutineRecord> + '_ {
        self.records.iter().filter(|record| record.was_invoked())
    }

    /// One `(routine, caller)` edge per invoked routine
    pub fn edges(&self) -> Vec<Edge> {
        self.invoked()
            .map(|record| Edge {
                function_id: record.id,
                caller_id: record.caller_id.unwrap_or(ROOT_ROUTINE_ID),
            })
            .collect()
    }
}

fn truncate_name(name: &str) -> String {
    if name.len() <= MAX_ROUTINE_NAME_LEN {
        return name.to_string();
    }
    let mut end = MAX_ROUTINE_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    tracing::warn!(
        "Routine name '{}' exceeds {} bytes, truncated to '{}'",
        name,
        MAX_ROUTINE_NAME_LEN,
        &name[..end]
    );
    name[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter_source::ManualSource;

    fn started(kinds: &[CounterKind]) -> (ManualSource, MeasurementStore<ManualSource>) {
        let clock = ManualSource::new();
        let mut store = MeasurementStore::new(clock.clone());
        store.init(kinds).unwrap();
        (clock, store)
    }

    #[test]
    fn test_records_zeroed_after_init() {
        let (_clock, store) = started(&[CounterKind::TotalCycles, CounterKind::L1CacheMisses]);
        for id in 0..store.capacity() {
            let record = store.get(id).unwrap();
            assert_eq!(record.times_called, 0);
            assert_eq!(record.total_real_us, 0);
            assert_eq!(record.counters, vec![0, 0]);
            assert!(record.name.is_none());
            assert!(record.caller_id.is_none());
        }
    }

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("short"), "short");
        assert_eq!(truncate_name("exactly-15-byte"), "exactly-15-byte");
        assert_eq!(truncate_name("this-name-is-far-too-long"), "this-name-is-fa");
        // 'é' is two bytes and straddles the limit
        assert_eq!(truncate_name("aaaaaaaaaaaaaaé"), "aaaaaaaaaaaaaa");
    }

    #[test]
    fn test_begin_latches_first_name_and_caller() {
        let (clock, mut store) = started(&[]);
        store.begin(3, "first", 1).unwrap();
        clock.advance_time(5);
        store.end(3).unwrap();

        store.begin(3, "second", 2).unwrap();
        store.end(3).unwrap();

        let record = store.get(3).unwrap();
        assert_eq!(record.name.as_deref(), Some("first"));
        assert_eq!(record.caller_id, Some(1));
        assert_eq!(record.times_called, 2);
        assert_eq!(record.total_real_us, 5);
    }

    #[test]
    fn test_recursive_interval_counted_once() {
        let (clock, mut store) = started(&[CounterKind::TotalInstructions]);

        store.begin(1, "fib", 0).unwrap();
        clock.advance_all(10);
        store.begin(1, "fib", 1).unwrap();
        clock.advance_all(20);
        store.end(1).unwrap();
        assert_eq!(store.get(1).unwrap().open_depth(), 1);
        clock.advance_all(30);
        store.end(1).unwrap();

        let record = store.get(1).unwrap();
        assert_eq!(record.times_called, 2);
        assert_eq!(record.total_real_us, 60);
        assert_eq!(record.counters, vec![60]);
        assert_eq!(record.caller_id, Some(0));
        assert_eq!(record.open_depth(), 0);
    }

    #[test]
    fn test_end_without_begin() {
        let (_clock, mut store) = started(&[]);
        assert!(matches!(store.end(4), Err(StopwatchError::NotStarted(4))));
    }

    #[test]
    fn test_out_of_range_ids() {
        let (_clock, mut store) = started(&[]);
        let cap = store.capacity();
        assert!(matches!(
            store.get(cap),
            Err(StopwatchError::OutOfRange { index, limit }) if index == cap && limit == cap
        ));
        assert!(store.begin(cap, "x", 0).is_err());
        assert!(store.begin(1, "x", cap).is_err());
        assert!(store.end(cap + 10).is_err());
        assert!(store.result(cap).is_err());
    }

    #[test]
    fn test_begin_requires_init() {
        let mut store = MeasurementStore::new(ManualSource::new());
        assert!(matches!(
            store.begin(1, "x", 0),
            Err(StopwatchError::NotInitialized)
        ));
        assert!(matches!(store.end(1), Err(StopwatchError::NotInitialized)));
    }

    #[test]
    fn test_read_failure_leaves_record_untouched() {
        let (clock, mut store) = started(&[CounterKind::TotalCycles]);
        clock.fail_next_reads(1);
        assert!(matches!(
            store.begin(1, "x", 0),
            Err(StopwatchError::CounterReadError(_))
        ));
        let record = store.get(1).unwrap();
        assert_eq!(record.open_depth(), 0);
        assert!(record.name.is_none());

        store.begin(1, "x", 0).unwrap();
        clock.fail_next_reads(1);
        assert!(store.end(1).is_err());
        let record = store.get(1).unwrap();
        assert_eq!(record.times_called, 0);
        assert_eq!(record.open_depth(), 0);
    }

    #[test]
    fn test_failed_end_does_not_poison_later_intervals() {
        let (clock, mut store) = started(&[CounterKind::TotalCycles]);
        store.begin(1, "x", 0).unwrap();
        clock.advance_all(10);
        clock.fail_next_reads(1);
        assert!(store.end(1).is_err());

        for _ in 0..3 {
            store.begin(1, "x", 0).unwrap();
            clock.advance_all(100);
            store.end(1).unwrap();
        }

        let record = store.get(1).unwrap();
        assert_eq!(record.times_called, 3);
        assert_eq!(record.total_real_us, 300);
        assert_eq!(record.counters, vec![300]);
        assert_eq!(record.open_depth(), 0);
    }

    #[test]
    fn test_duplicate_counter_selection_rejected() {
        let clock = ManualSource::new();
        let mut store = MeasurementStore::new(clock.clone());
        let err = store
            .init(&[CounterKind::TotalCycles, CounterKind::TotalCycles])
            .unwrap_err();
        assert!(matches!(err, StopwatchError::UnsupportedCombination(_)));
        assert!(!store.is_initialized());
    }

    #[test]
    fn test_measure_nested() {
        let (clock, mut store) = started(&[]);
        let value = store
            .measure(1, "outer", 0, |s| {
                clock.advance_time(1);
                s.measure(2, "inner", 1, |_| {
                    clock.advance_time(4);
                    21 * 2
                })
                .unwrap()
            })
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(store.get(1).unwrap().total_real_us, 5);
        assert_eq!(store.get(2).unwrap().total_real_us, 4);
        assert_eq!(store.get(2).unwrap().caller_id, Some(1));
    }

    #[test]
    fn test_edges_only_for_invoked_routines() {
        let (_clock, mut store) = started(&[]);
        store.begin(5, "a", 0).unwrap();
        store.end(5).unwrap();
        store.begin(2, "b", 5).unwrap();
        store.end(2).unwrap();
        store.begin(9, "open", 2).unwrap();

        let edges = store.edges();
        assert_eq!(
            edges,
            vec![
                Edge {
                    function_id: 2,
                    caller_id: 5
                },
                Edge {
                    function_id: 5,
                    caller_id: 0
                },
            ]
        );
    }

    #[test]
    fn test_result_display() {
        let (clock, mut store) = started(&[CounterKind::L1CacheMisses]);
        store.begin(1, "mat-mul", 0).unwrap();
        clock.advance_all(12);
        store.end(1).unwrap();

        let text = store.result(1).unwrap().to_string();
        assert_eq!(
            text,
            "Procedure name: mat-mul\nTotal times run: 1\nTotal real microseconds elapsed: 12\nPAPI_L1_TCM: 12"
        );
    }
}
