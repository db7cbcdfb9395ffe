//! Counter backends consumed by the measurement store
//!
//! The store never reads hardware or OS counters itself. It talks to a
//! [`CounterSource`], which resolves counter names, accepts or rejects a
//! counter selection, and produces snapshots of monotonically increasing
//! values on demand.
//!
//! Two backends ship with the crate:
//! - [`RusageSource`]: software counters from `getrusage(RUSAGE_SELF)`
//! - [`ManualSource`]: deterministic, caller-advanced values with a
//!   configurable register limit and injectable read failures

use crate::error::{Result, StopwatchError};
use nix::sys::resource::{getrusage, Usage, UsageWho};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::time::Instant;

/// A selectable counter kind
///
/// Hardware kinds carry PAPI preset names so selections written for
/// PAPI-based tooling keep working; software kinds use the `SW_` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CounterKind {
    /// Total CPU cycles
    TotalCycles,
    /// Total instructions retired
    TotalInstructions,
    /// L1 cache misses (data + instruction)
    L1CacheMisses,
    /// Cycles stalled waiting on any resource
    CyclesStalledResource,
    /// User CPU time in microseconds
    UserTimeUs,
    /// System CPU time in microseconds
    SystemTimeUs,
    /// Minor (soft) page faults
    MinorFaults,
    /// Major (hard) page faults
    MajorFaults,
    /// Voluntary context switches
    VoluntaryContextSwitches,
    /// Involuntary context switches
    InvoluntaryContextSwitches,
}

impl CounterKind {
    /// Number of known counter kinds
    pub const COUNT: usize = 10;

    /// Every known kind, in declaration order
    pub const ALL: [CounterKind; Self::COUNT] = [
        CounterKind::TotalCycles,
        CounterKind::TotalInstructions,
        CounterKind::L1CacheMisses,
        CounterKind::CyclesStalledResource,
        CounterKind::UserTimeUs,
        CounterKind::SystemTimeUs,
        CounterKind::MinorFaults,
        CounterKind::MajorFaults,
        CounterKind::VoluntaryContextSwitches,
        CounterKind::InvoluntaryContextSwitches,
    ];

    /// Stable name used in configuration, table headers and CSV headers
    pub fn name(self) -> &'static str {
        match self {
            CounterKind::TotalCycles => "PAPI_TOT_CYC",
            CounterKind::TotalInstructions => "PAPI_TOT_INS",
            CounterKind::L1CacheMisses => "PAPI_L1_TCM",
            CounterKind::CyclesStalledResource => "PAPI_RES_STL",
            CounterKind::UserTimeUs => "SW_USER_USEC",
            CounterKind::SystemTimeUs => "SW_SYS_USEC",
            CounterKind::MinorFaults => "SW_MINOR_FAULTS",
            CounterKind::MajorFaults => "SW_MAJOR_FAULTS",
            CounterKind::VoluntaryContextSwitches => "SW_VOL_CTX",
            CounterKind::InvoluntaryContextSwitches => "SW_INVOL_CTX",
        }
    }

    /// Look up a kind by its stable name (exact, case-sensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Whether this kind needs a hardware performance monitoring unit
    pub fn is_hardware(self) -> bool {
        matches!(
            self,
            CounterKind::TotalCycles
                | CounterKind::TotalInstructions
                | CounterKind::L1CacheMisses
                | CounterKind::CyclesStalledResource
        )
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CounterKind {
    type Err = StopwatchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| StopwatchError::InvalidCounter(s.to_string()))
    }
}

/// Backend that produces raw counter values
///
/// Lifecycle: `open` → `start` → any number of `read` → `stop` → `close`.
/// `close` must be safe to call in any state, including after a failed
/// `open`.
pub trait CounterSource {
    /// Whether the backend can count `kind`
    fn supports(&self, kind: CounterKind) -> bool;

    /// Resolve a counter name into a kind this backend supports
    fn resolve(&self, name: &str) -> Option<CounterKind> {
        CounterKind::from_name(name).filter(|kind| self.supports(*kind))
    }

    /// Counters used when the caller selects none
    fn default_counters(&self) -> Vec<CounterKind>;

    /// Bind the backend to a counter selection
    ///
    /// Fails with `InvalidCounter` for kinds the backend does not know and
    /// `UnsupportedCombination` when the set cannot be counted together.
    fn open(&mut self, kinds: &[CounterKind]) -> Result<()>;

    /// Start counting
    fn start(&mut self) -> Result<()>;

    /// Write the current value of every opened counter into `values`
    fn read(&mut self, values: &mut [i64]) -> Result<()>;

    /// Stop counting, writing final values into `values`
    fn stop(&mut self, values: &mut [i64]) -> Result<()>;

    /// Release the binding
    fn close(&mut self);

    /// Monotonic wall-clock timestamp in microseconds
    fn now_realtime_us(&self) -> i64;
}

fn check_supported<S: CounterSource + ?Sized>(source: &S, kinds: &[CounterKind]) -> Result<()> {
    match kinds.iter().find(|kind| !source.supports(**kind)) {
        Some(kind) => Err(StopwatchError::InvalidCounter(kind.name().to_string())),
        None => Ok(()),
    }
}

fn check_len(values: &[i64], expected: usize) -> Result<()> {
    if values.len() < expected {
        return Err(StopwatchError::CounterReadError(format!(
            "snapshot buffer holds {} values, {} counters are open",
            values.len(),
            expected
        )));
    }
    Ok(())
}

// =============================================================================
// getrusage backend
// =============================================================================

/// Software counters sampled from `getrusage(RUSAGE_SELF)`
///
/// Only the `SW_*` kinds are supported; selecting a hardware kind fails
/// with `InvalidCounter`.
#[derive(Debug)]
pub struct RusageSource {
    epoch: Instant,
    kinds: Vec<CounterKind>,
    running: bool,
}

impl RusageSource {
    /// Create an unbound backend
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            kinds: Vec::new(),
            running: false,
        }
    }

    fn sample(kind: CounterKind, usage: &Usage) -> i64 {
        match kind {
            CounterKind::UserTimeUs => {
                let tv = usage.user_time();
                i64::from(tv.tv_sec()) * 1_000_000 + i64::from(tv.tv_usec())
            }
            CounterKind::SystemTimeUs => {
                let tv = usage.system_time();
                i64::from(tv.tv_sec()) * 1_000_000 + i64::from(tv.tv_usec())
            }
            CounterKind::MinorFaults => i64::from(usage.minor_page_faults()),
            CounterKind::MajorFaults => i64::from(usage.major_page_faults()),
            CounterKind::VoluntaryContextSwitches => {
                i64::from(usage.voluntary_context_switches())
            }
            CounterKind::InvoluntaryContextSwitches => {
                i64::from(usage.involuntary_context_switches())
            }
            // Rejected by `open`
            _ => 0,
        }
    }

    fn snapshot(&self, values: &mut [i64]) -> Result<()> {
        check_len(values, self.kinds.len())?;
        let usage = getrusage(UsageWho::RUSAGE_SELF)
            .map_err(|e| StopwatchError::CounterReadError(format!("getrusage failed: {}", e)))?;
        for (slot, kind) in values.iter_mut().zip(&self.kinds) {
            *slot = Self::sample(*kind, &usage);
        }
        Ok(())
    }
}

impl Default for RusageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for RusageSource {
    fn supports(&self, kind: CounterKind) -> bool {
        !kind.is_hardware()
    }

    fn default_counters(&self) -> Vec<CounterKind> {
        vec![CounterKind::UserTimeUs, CounterKind::SystemTimeUs]
    }

    fn open(&mut self, kinds: &[CounterKind]) -> Result<()> {
        check_supported(self, kinds)?;
        self.kinds = kinds.to_vec();
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }

    fn read(&mut self, values: &mut [i64]) -> Result<()> {
        if !self.running {
            return Err(StopwatchError::CounterReadError(
                "counters are not running".to_string(),
            ));
        }
        self.snapshot(values)
    }

    fn stop(&mut self, values: &mut [i64]) -> Result<()> {
        if !self.running {
            return Err(StopwatchError::CounterReadError(
                "counters are not running".to_string(),
            ));
        }
        self.running = false;
        self.snapshot(values)
    }

    fn close(&mut self) {
        self.running = false;
        self.kinds.clear();
    }

    fn now_realtime_us(&self) -> i64 {
        i64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(i64::MAX)
    }
}

// =============================================================================
// Manual backend
// =============================================================================

#[derive(Debug, Default)]
struct ManualState {
    now_us: i64,
    values: [i64; CounterKind::COUNT],
    kinds: Vec<CounterKind>,
    register_limit: Option<usize>,
    failing_reads: usize,
    running: bool,
    open: bool,
    close_calls: usize,
}

/// Deterministic backend whose clock and counters only move when told to
///
/// Clones share state, so a handle kept by the caller can drive a source
/// owned by a [`MeasurementStore`](crate::store::MeasurementStore).
///
/// # Example
/// ```
/// use stopwatch::counter_source::{CounterKind, ManualSource};
/// use stopwatch::store::MeasurementStore;
///
/// let clock = ManualSource::new();
/// let mut store = MeasurementStore::new(clock.clone());
/// store.init(&[CounterKind::TotalCycles]).unwrap();
///
/// store.begin(1, "work", 0).unwrap();
/// clock.advance_time(250);
/// clock.advance_counter(CounterKind::TotalCycles, 1_000);
/// store.end(1).unwrap();
///
/// let record = store.get(1).unwrap();
/// assert_eq!(record.total_real_us, 250);
/// assert_eq!(record.counters, vec![1_000]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualSource {
    state: Rc<RefCell<ManualState>>,
}

impl ManualSource {
    /// Create a source with every counter and the clock at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject selections with more than `limit` counters
    pub fn with_register_limit(limit: usize) -> Self {
        let source = Self::new();
        source.state.borrow_mut().register_limit = Some(limit);
        source
    }

    /// Move the wall clock forward
    pub fn advance_time(&self, us: i64) {
        self.state.borrow_mut().now_us += us;
    }

    /// Move a single counter forward
    pub fn advance_counter(&self, kind: CounterKind, delta: i64) {
        self.state.borrow_mut().values[kind.index()] += delta;
    }

    /// Move the clock and every counter forward by the same amount
    pub fn advance_all(&self, delta: i64) {
        let mut state = self.state.borrow_mut();
        state.now_us += delta;
        for value in state.values.iter_mut() {
            *value += delta;
        }
    }

    /// Make the next `count` reads fail with `CounterReadError`
    pub fn fail_next_reads(&self, count: usize) {
        self.state.borrow_mut().failing_reads = count;
    }

    /// Whether the source is currently bound to a selection
    pub fn is_open(&self) -> bool {
        self.state.borrow().open
    }

    /// Whether the source is counting
    pub fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    /// Number of times `close` has been called
    pub fn close_calls(&self) -> usize {
        self.state.borrow().close_calls
    }

    fn snapshot(state: &mut ManualState, values: &mut [i64]) -> Result<()> {
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(StopwatchError::CounterReadError(
                "injected read failure".to_string(),
            ));
        }
        if !state.running {
            return Err(StopwatchError::CounterReadError(
                "counters are not running".to_string(),
            ));
        }
        check_len(values, state.kinds.len())?;
        for (slot, kind) in values.iter_mut().zip(&state.kinds) {
            *slot = state.values[kind.index()];
        }
        Ok(())
    }
}

impl CounterSource for ManualSource {
    fn supports(&self, _kind: CounterKind) -> bool {
        true
    }

    fn default_counters(&self) -> Vec<CounterKind> {
        vec![CounterKind::TotalCycles, CounterKind::TotalInstructions]
    }

    fn open(&mut self, kinds: &[CounterKind]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if let Some(limit) = state.register_limit {
            if kinds.len() > limit {
                return Err(StopwatchError::UnsupportedCombination(format!(
                    "{} counters requested, backend can count {} at once",
                    kinds.len(),
                    limit
                )));
            }
        }
        state.kinds = kinds.to_vec();
        state.open = true;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.open {
            return Err(StopwatchError::CounterReadError(
                "source is not open".to_string(),
            ));
        }
        state.running = true;
        Ok(())
    }

    fn read(&mut self, values: &mut [i64]) -> Result<()> {
        Self::snapshot(&mut self.state.borrow_mut(), values)
    }

    fn stop(&mut self, values: &mut [i64]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let result = Self::snapshot(&mut state, values);
        state.running = false;
        result
    }

    fn close(&mut self) {
        let mut state = self.state.borrow_mut();
        state.running = false;
        state.open = false;
        state.kinds.clear();
        state.close_calls += 1;
    }

    fn now_realtime_us(&self) -> i64 {
        self.state.borrow().now_us
    }
}
