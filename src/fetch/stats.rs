use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Outcome of one API call, as seen by the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
}

/// Volume and call counters shared by the controller and every page task.
///
/// Lifetime counters only ever grow. Cycle counters are zeroed by
/// [`FetchStats::begin_cycle`]. Updates from concurrent tasks may interleave in
/// any order.
#[derive(Debug, Default)]
pub struct FetchStats {
    events: AtomicU64,
    bytes: AtomicU64,
    calls: AtomicU64,
    failed_calls: AtomicU64,
    cycles: AtomicU64,

    cycle_events: AtomicU64,
    cycle_calls: AtomicU64,
    cycle_network_micros: AtomicU64,
}

impl FetchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the per-cycle counters. Called once per poll cycle before the first fetch.
    pub fn begin_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.cycle_events.store(0, Ordering::Relaxed);
        self.cycle_calls.store(0, Ordering::Relaxed);
        self.cycle_network_micros.store(0, Ordering::Relaxed);
    }

    pub fn record_event(&self, count: u64) {
        self.events.fetch_add(count, Ordering::Relaxed);
        self.cycle_events.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_api_call(&self, outcome: CallOutcome) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.cycle_calls.fetch_add(1, Ordering::Relaxed);
        if outcome == CallOutcome::Failure {
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_bytes(&self, count: u64) {
        self.bytes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_network_time(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.cycle_network_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events: self.events.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            calls: self.calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            cycle_events: self.cycle_events.load(Ordering::Relaxed),
            cycle_calls: self.cycle_calls.load(Ordering::Relaxed),
            cycle_network_time: Duration::from_micros(
                self.cycle_network_micros.load(Ordering::Relaxed),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub events: u64,
    pub bytes: u64,
    pub calls: u64,
    pub failed_calls: u64,
    pub cycles: u64,
    pub cycle_events: u64,
    pub cycle_calls: u64,
    pub cycle_network_time: Duration,
}
