//! Interval-driven sampling loop run on the monitor's worker thread.
//!
//! Lifecycle: `Idle → Ticking → Stopping → Done`.
//!
//! - Every iteration checks the cancellation token, whether or not a poll is due.
//! - A poll is due once `dt`, the wall time since the previous poll began, reaches
//!   the interval. Before the first poll `dt` is taken to be the interval, so the
//!   first poll happens immediately.
//! - Elapsed time is accumulated from the `dt` of each successful poll, not
//!   re-measured from the session start; overrunning polls make it drift from
//!   the wall clock.
//! - A failed poll (error or panic in the source) appends nothing and is not
//!   retried; the timer still resets.
//! - After cancellation exactly one more poll is attempted to capture the
//!   in-flight interval, then the loop finishes.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use crate::classify::classify_batch;
use crate::sensor::SensorSource;
use crate::store::SampleStore;

/// Longest nap between iterations when no poll is due.
pub const DEFAULT_IDLE_SLEEP: Duration = Duration::from_millis(5);

/// Phase of a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// Built but not yet running.
    Idle,
    /// Polling on the interval.
    Ticking,
    /// Cancellation observed; taking the final reading.
    Stopping,
    /// Finished; the store will not grow any more.
    Done,
}

impl LoopState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Ticking,
            2 => Self::Stopping,
            _ => Self::Done,
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Ticking => write!(f, "ticking"),
            Self::Stopping => write!(f, "stopping"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Loop state readable from other threads.
#[derive(Debug, Clone)]
pub struct StateHandle(Arc<AtomicU8>);

impl StateHandle {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(LoopState::Idle as u8)))
    }

    pub(crate) fn set(&self, state: LoopState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub fn get(&self) -> LoopState {
        LoopState::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Cooperative cancellation flag shared by the monitor and its worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters reported when a loop finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Polls committed to the store (equals the elapsed-time entries written).
    pub polls: u64,
    /// Polls discarded because the source failed.
    pub failures: u64,
    /// Loop iterations, including those where no poll was due.
    pub iterations: u64,
}

/// Pulls from a sensor source on an interval and fills a [`SampleStore`].
pub struct PollingLoop {
    source: Box<dyn SensorSource>,
    store: Arc<SampleStore>,
    cancel: CancelToken,
    interval: Duration,
    idle_sleep: Duration,
    state: StateHandle,
    stats: LoopStats,
}

impl PollingLoop {
    pub fn new(
        source: Box<dyn SensorSource>,
        store: Arc<SampleStore>,
        cancel: CancelToken,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            store,
            cancel,
            interval,
            idle_sleep: DEFAULT_IDLE_SLEEP,
            state: StateHandle::new(),
            stats: LoopStats::default(),
        }
    }

    /// Override the longest nap taken while waiting for the next poll.
    pub fn with_idle_sleep(mut self, idle_sleep: Duration) -> Self {
        self.idle_sleep = idle_sleep;
        self
    }

    /// Report state through an existing handle instead of a fresh one.
    pub(crate) fn with_state(mut self, state: StateHandle) -> Self {
        state.set(self.state.get());
        self.state = state;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state.get()
    }

    /// Handle for observing the state from another thread.
    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Run until cancelled. Blocks the calling thread.
    pub fn run(&mut self) -> LoopStats {
        self.state.set(LoopState::Ticking);
        log::debug!(
            "polling {} every {:?}",
            self.source.namespace(),
            self.interval
        );

        let mut last_poll: Option<Instant> = None;
        loop {
            self.stats.iterations += 1;
            // Full precision; dt is not quantised to 0.1 s before comparing or summing.
            let dt = last_poll.map_or(self.interval, |t| t.elapsed());

            if self.cancel.is_cancelled() {
                self.state.set(LoopState::Stopping);
                self.poll(dt);
                break;
            }

            if dt >= self.interval {
                last_poll = Some(Instant::now());
                self.poll(dt);
            } else {
                let nap = self
                    .idle_sleep
                    .min(self.interval / 20)
                    .min(self.interval - dt);
                std::thread::sleep(nap);
            }
        }

        self.state.set(LoopState::Done);
        log::debug!(
            "polling finished: {} polls, {} failed, {} iterations",
            self.stats.polls,
            self.stats.failures,
            self.stats.iterations
        );
        self.stats
    }

    /// Attempt one poll. Returns whether it was committed.
    fn poll(&mut self, dt: Duration) -> bool {
        let source = &mut self.source;
        let records = match catch_unwind(AssertUnwindSafe(|| source.read())) {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                self.stats.failures += 1;
                log::warn!("sensor poll failed, dropping tick: {e}");
                return false;
            }
            Err(_) => {
                self.stats.failures += 1;
                log::warn!("sensor source panicked, dropping tick");
                return false;
            }
        };

        let samples = classify_batch(&records);
        let elapsed = self.store.record_poll(&samples, dt.as_secs_f64());
        self.stats.polls += 1;
        log::trace!(
            "poll {}: {} records, {} classified, elapsed {elapsed:.3}s",
            self.stats.polls,
            records.len(),
            samples.len()
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::SeriesKey;
    use crate::error::SourceError;
    use crate::sensor::{RawSensorRecord, SensorType};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    // -----------------------------------------------------------------------
    // Mock sensor sources
    // -----------------------------------------------------------------------

    type Scripted = Result<Vec<RawSensorRecord>, SourceError>;

    /// Replays scripted reads, then returns empty batches forever.
    struct ScriptedSource {
        script: VecDeque<Scripted>,
        reads: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Scripted>) -> (Self, Arc<AtomicUsize>) {
            let reads = Arc::new(AtomicUsize::new(0));
            let source = Self {
                script: script.into(),
                reads: Arc::clone(&reads),
            };
            (source, reads)
        }
    }

    impl SensorSource for ScriptedSource {
        fn namespace(&self) -> &str {
            "scripted"
        }

        fn read(&mut self) -> Result<Vec<RawSensorRecord>, SourceError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.script.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// Always reports the same batch.
    struct SteadySource(Vec<RawSensorRecord>);

    impl SensorSource for SteadySource {
        fn namespace(&self) -> &str {
            "steady"
        }

        fn read(&mut self) -> Result<Vec<RawSensorRecord>, SourceError> {
            Ok(self.0.clone())
        }
    }

    struct PanickingSource;

    impl SensorSource for PanickingSource {
        fn namespace(&self) -> &str {
            "panicking"
        }

        fn read(&mut self) -> Result<Vec<RawSensorRecord>, SourceError> {
            panic!("backend exploded");
        }
    }

    fn cpu_power(value: f64) -> Vec<RawSensorRecord> {
        vec![RawSensorRecord::new("CPU Package", SensorType::Power, value)]
    }

    fn wait_for(reads: &AtomicUsize, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while reads.load(Ordering::SeqCst) < n {
            assert!(Instant::now() < deadline, "timed out waiting for {n} reads");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Run a loop on a thread; returns the store, cancel token and join handle.
    fn spawn_loop(
        source: Box<dyn SensorSource>,
        interval: Duration,
    ) -> (
        Arc<SampleStore>,
        CancelToken,
        StateHandle,
        std::thread::JoinHandle<LoopStats>,
    ) {
        let store = Arc::new(SampleStore::new());
        let cancel = CancelToken::new();
        let mut polling = PollingLoop::new(source, Arc::clone(&store), cancel.clone(), interval);
        let state = polling.state_handle();
        let handle = std::thread::spawn(move || polling.run());
        (store, cancel, state, handle)
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[test]
    fn new_loop_is_idle() {
        let polling = PollingLoop::new(
            Box::new(SteadySource(Vec::new())),
            Arc::new(SampleStore::new()),
            CancelToken::new(),
            Duration::from_millis(10),
        );
        assert_eq!(polling.state(), LoopState::Idle);
        assert_eq!(polling.stats(), LoopStats::default());
    }

    #[test]
    fn cancelled_before_start_takes_exactly_one_reading() {
        let store = Arc::new(SampleStore::new());
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut polling = PollingLoop::new(
            Box::new(SteadySource(cpu_power(30.0))),
            Arc::clone(&store),
            cancel,
            Duration::from_millis(250),
        );
        let stats = polling.run();

        assert_eq!(polling.state(), LoopState::Done);
        assert_eq!(stats.polls, 1);
        assert_eq!(stats.iterations, 1);
        let snap = store.snapshot();
        assert_eq!(snap.cpu_power, vec![30.0]);
        // No poll had happened yet, so dt is the interval.
        assert_eq!(snap.elapsed_time, vec![0.25]);
    }

    #[test]
    fn first_poll_is_immediate_and_elapsed_starts_at_interval() {
        let (source, reads) = ScriptedSource::new(vec![Ok(cpu_power(10.0))]);
        let (store, cancel, _state, handle) =
            spawn_loop(Box::new(source), Duration::from_secs(60));
        wait_for(&reads, 1);
        cancel.cancel();
        let stats = handle.join().unwrap();

        // The scripted poll plus the final reading after cancellation.
        assert_eq!(stats.polls, 2);
        let snap = store.snapshot();
        assert_eq!(snap.cpu_power, vec![10.0]);
        assert_eq!(snap.elapsed_time.len(), 2);
        assert_eq!(snap.elapsed_time[0], 60.0);
        assert!(snap.elapsed_time[1] >= snap.elapsed_time[0]);
    }

    #[test]
    fn elapsed_time_counts_polls_not_iterations() {
        let (source, reads) = ScriptedSource::new(Vec::new());
        let (store, cancel, _state, handle) =
            spawn_loop(Box::new(source), Duration::from_millis(20));
        wait_for(&reads, 4);
        cancel.cancel();
        let stats = handle.join().unwrap();

        let snap = store.snapshot();
        assert_eq!(snap.elapsed_time.len() as u64, stats.polls);
        assert!(stats.iterations > stats.polls);
        assert!(snap.elapsed_time.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn sub_decisecond_intervals_keep_full_precision() {
        let interval = Duration::from_millis(30);
        let (source, reads) = ScriptedSource::new(vec![Ok(cpu_power(1.0)), Ok(cpu_power(2.0))]);
        let (store, cancel, _state, handle) = spawn_loop(Box::new(source), interval);
        wait_for(&reads, 2);
        cancel.cancel();
        handle.join().unwrap();

        let elapsed = store.snapshot().elapsed_time;
        // Quantising to 0.1 s would have made this 0.0.
        assert_eq!(elapsed[0], 0.03);
        assert!(elapsed[1] - elapsed[0] >= 0.03 - 1e-9);
    }

    #[test]
    fn due_polls_are_at_least_one_interval_apart() {
        let interval = Duration::from_millis(30);
        let (source, reads) = ScriptedSource::new(Vec::new());
        let (store, cancel, _state, handle) = spawn_loop(Box::new(source), interval);
        wait_for(&reads, 4);
        cancel.cancel();
        handle.join().unwrap();

        let elapsed = store.snapshot().elapsed_time;
        // The last entry is the final reading, which may come early.
        for w in elapsed[..elapsed.len() - 1].windows(2) {
            assert!(w[1] - w[0] >= interval.as_secs_f64() - 1e-9);
        }
    }

    #[test]
    fn failed_tick_appends_nothing() {
        let (source, reads) = ScriptedSource::new(vec![
            Ok(cpu_power(45.3)),
            Err(SourceError::Read("bus timeout".to_string())),
            Ok(cpu_power(45.3)),
        ]);
        let (store, cancel, _state, handle) =
            spawn_loop(Box::new(source), Duration::from_millis(10));
        wait_for(&reads, 3);
        cancel.cancel();
        let stats = handle.join().unwrap();

        assert_eq!(stats.failures, 1);
        let snap = store.snapshot();
        assert_eq!(snap.cpu_power, vec![45.3, 45.3]);
        assert_eq!(snap.elapsed_time.len() as u64, stats.polls);
    }

    #[test]
    fn panicking_source_is_a_failed_poll() {
        let store = Arc::new(SampleStore::new());
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut polling = PollingLoop::new(
            Box::new(PanickingSource),
            Arc::clone(&store),
            cancel,
            Duration::from_millis(10),
        );
        let stats = polling.run();

        assert_eq!(stats.polls, 0);
        assert_eq!(stats.failures, 1);
        assert_eq!(polling.state(), LoopState::Done);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn state_moves_to_ticking_then_done() {
        let (source, reads) = ScriptedSource::new(Vec::new());
        let (_store, cancel, state, handle) =
            spawn_loop(Box::new(source), Duration::from_millis(10));
        wait_for(&reads, 1);
        assert_eq!(state.get(), LoopState::Ticking);
        cancel.cancel();
        handle.join().unwrap();
        assert_eq!(state.get(), LoopState::Done);
    }

    #[test]
    fn unrecognised_records_still_complete_the_poll() {
        let store = Arc::new(SampleStore::new());
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut polling = PollingLoop::new(
            Box::new(SteadySource(vec![
                RawSensorRecord::new("GPU Memory", SensorType::Load, 12.0),
                RawSensorRecord::new("Fan #2", SensorType::Other, 900.0),
            ])),
            Arc::clone(&store),
            cancel,
            Duration::from_millis(10),
        );
        polling.run();

        let snap = store.snapshot();
        assert_eq!(snap.polls(), 1);
        for key in SeriesKey::ALL {
            assert!(snap.series(key).is_empty());
        }
    }

    #[test]
    fn snapshots_taken_while_ticking_grow_monotonically() {
        let source = SteadySource(vec![
            RawSensorRecord::new("CPU Package", SensorType::Power, 20.0),
            RawSensorRecord::new("GPU Core", SensorType::Temperature, 55.0),
        ]);
        let (store, cancel, _state, handle) =
            spawn_loop(Box::new(source), Duration::from_millis(5));
        let mut last = 0;
        for _ in 0..50 {
            let snap = store.snapshot();
            assert_eq!(snap.cpu_power.len(), snap.elapsed_time.len());
            assert_eq!(snap.gpu_temp.len(), snap.elapsed_time.len());
            assert!(snap.polls() >= last);
            last = snap.polls();
            std::thread::sleep(Duration::from_millis(1));
        }
        cancel.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn loop_state_display() {
        assert_eq!(LoopState::Ticking.to_string(), "ticking");
        assert_eq!(LoopState::Done.to_string(), "done");
    }
}
