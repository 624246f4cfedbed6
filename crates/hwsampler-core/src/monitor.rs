//! Public controller over a supervised sampling worker.
//!
//! A [`Monitor`] owns at most one session at a time. `start` spawns a worker
//! thread that builds the sensor source, optionally raises its own priority,
//! and runs a [`PollingLoop`] into a fresh [`SampleStore`]. `stop` cancels the
//! worker and waits a bounded time for it; `snapshot` copies the store out at
//! any point, including after the session stopped.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use log::Level;
use uuid::Uuid;

use crate::error::{MonitorError, Result, SourceError};
use crate::platform;
use crate::polling::{CancelToken, DEFAULT_IDLE_SLEEP, LoopState, LoopStats, PollingLoop, StateHandle};
use crate::sensor::{DEFAULT_NAMESPACE, SensorSource, SourceFactory};
use crate::sources::HwmonSource;
use crate::store::{SampleStore, Snapshot};

/// Name given to worker threads.
pub const WORKER_THREAD_NAME: &str = "hwsampler-worker";

/// Sampling interval used when the caller has no preference.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Extra time `stop` waits beyond one interval.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(1);

/// Tuning knobs that stay fixed across sessions.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Longest nap the worker takes while no poll is due.
    pub idle_sleep: Duration,
    /// `stop` gives up after `interval + stop_grace`.
    pub stop_grace: Duration,
    /// Ask for a higher scheduling priority on the worker thread.
    pub elevate_priority: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            idle_sleep: DEFAULT_IDLE_SLEEP,
            stop_grace: DEFAULT_STOP_GRACE,
            elevate_priority: true,
        }
    }
}

struct Worker {
    handle: JoinHandle<LoopStats>,
    // Disconnects when the worker thread exits, however it exits.
    done: mpsc::Receiver<()>,
}

struct Session {
    id: Uuid,
    interval: Duration,
    verbose: bool,
    store: Arc<SampleStore>,
    cancel: CancelToken,
    state: StateHandle,
    worker: Option<Worker>,
    stats: Option<LoopStats>,
}

impl Session {
    fn log_level(&self) -> Level {
        lifecycle_level(self.verbose)
    }
}

fn lifecycle_level(verbose: bool) -> Level {
    if verbose { Level::Info } else { Level::Debug }
}

/// Start/stop/snapshot controller for background sensor sampling.
pub struct Monitor {
    factory: SourceFactory,
    config: MonitorConfig,
    session: Option<Session>,
}

impl Monitor {
    /// Create a monitor whose worker builds its source with `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> std::result::Result<Box<dyn SensorSource>, SourceError> + Send + Sync + 'static,
    {
        Self::with_config(factory, MonitorConfig::default())
    }

    pub fn with_config<F>(factory: F, config: MonitorConfig) -> Self
    where
        F: Fn() -> std::result::Result<Box<dyn SensorSource>, SourceError> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            config,
            session: None,
        }
    }

    /// Monitor backed by the Linux hwmon source at [`DEFAULT_NAMESPACE`].
    pub fn hwmon() -> Self {
        Self::new(|| {
            HwmonSource::open(DEFAULT_NAMESPACE).map(|s| Box::new(s) as Box<dyn SensorSource>)
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Whether a session's worker is active (started and not yet stopped).
    pub fn is_running(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.worker.is_some())
    }

    /// Identifier of the current or most recent session.
    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Interval of the current or most recent session.
    pub fn interval(&self) -> Option<Duration> {
        self.session.as_ref().map(|s| s.interval)
    }

    /// Loop state of the current or most recent worker.
    pub fn worker_state(&self) -> Option<LoopState> {
        self.session.as_ref().map(|s| s.state.get())
    }

    /// Counters of the most recent cleanly stopped session.
    pub fn last_stats(&self) -> Option<LoopStats> {
        self.session.as_ref().and_then(|s| s.stats)
    }

    /// Begin a new session sampling every `interval`.
    ///
    /// Returns as soon as the worker thread is spawned; the first sample is
    /// taken asynchronously. `verbose` logs lifecycle events at `info`
    /// instead of `debug`.
    pub fn start(&mut self, interval: Duration, verbose: bool) -> Result<()> {
        if self.is_running() {
            return Err(MonitorError::AlreadyRunning);
        }
        if interval.is_zero() {
            return Err(MonitorError::InvalidInterval);
        }

        let id = Uuid::new_v4();
        let store = Arc::new(SampleStore::new());
        let cancel = CancelToken::new();
        let state = StateHandle::new();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let ctx = WorkerContext {
            id,
            interval,
            factory: Arc::clone(&self.factory),
            config: self.config.clone(),
            store: Arc::clone(&store),
            cancel: cancel.clone(),
            state: state.clone(),
        };
        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let _done = done_tx;
                ctx.run()
            })
            .map_err(MonitorError::Spawn)?;

        log::log!(
            lifecycle_level(verbose),
            "monitoring session {id} started (interval {interval:?})"
        );

        self.session = Some(Session {
            id,
            interval,
            verbose,
            store,
            cancel,
            state,
            worker: Some(Worker {
                handle,
                done: done_rx,
            }),
            stats: None,
        });
        Ok(())
    }

    /// Cancel the worker and wait up to `interval + stop_grace` for it.
    ///
    /// The worker takes one final reading before it finishes. If it does not
    /// finish in time it is detached, not killed, and `ShutdownTimeout` is
    /// returned; the session is considered stopped either way. Calling `stop`
    /// without a running session does nothing.
    pub fn stop(&mut self) -> Result<()> {
        let grace = self.config.stop_grace;
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let Some(worker) = session.worker.take() else {
            return Ok(());
        };

        session.cancel.cancel();
        let timeout = session.interval.saturating_add(grace);
        match worker.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "monitoring session {} worker still running after {timeout:?}; abandoning it",
                    session.id
                );
                Err(MonitorError::ShutdownTimeout { timeout })
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                match worker.handle.join() {
                    Ok(stats) => {
                        log::log!(
                            session.log_level(),
                            "monitoring session {} stopped: {} polls, {} failed",
                            session.id,
                            stats.polls,
                            stats.failures
                        );
                        session.stats = Some(stats);
                    }
                    Err(_) => log::error!("monitoring session {} worker panicked", session.id),
                }
                Ok(())
            }
        }
    }

    /// Copy of every series accumulated by the current or last session.
    pub fn snapshot(&self) -> Result<Snapshot> {
        self.session
            .as_ref()
            .map(|s| s.store.snapshot())
            .ok_or(MonitorError::NoSession)
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(session) = &self.session
            && session.worker.is_some()
        {
            session.cancel.cancel();
        }
    }
}

/// Everything the worker thread needs, moved in at spawn.
struct WorkerContext {
    id: Uuid,
    interval: Duration,
    factory: SourceFactory,
    config: MonitorConfig,
    store: Arc<SampleStore>,
    cancel: CancelToken,
    state: StateHandle,
}

impl WorkerContext {
    fn run(self) -> LoopStats {
        let (pid, thread) = platform::worker_identity();
        log::debug!("monitoring session {}: worker {thread} in pid {pid}", self.id);

        if self.config.elevate_priority {
            match platform::set_current_thread_nice(platform::WORKER_NICE) {
                Ok(()) => log::debug!("worker nice set to {}", platform::WORKER_NICE),
                Err(e) if e.kind() == std::io::ErrorKind::Unsupported => {
                    log::debug!("worker priority left unchanged: {e}");
                }
                Err(e) => log::warn!("could not raise worker priority: {e}"),
            }
        }

        let source = match (self.factory)() {
            Ok(source) => source,
            Err(e) => {
                log::error!(
                    "monitoring session {}: sensor source failed to initialise: {e}",
                    self.id
                );
                self.state.set(LoopState::Done);
                return LoopStats::default();
            }
        };

        PollingLoop::new(source, self.store, self.cancel, self.interval)
            .with_idle_sleep(self.config.idle_sleep)
            .with_state(self.state)
            .run()
    }
}
