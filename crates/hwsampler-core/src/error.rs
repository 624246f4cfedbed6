//! Error types for sensor sources and the monitor lifecycle.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors raised by a [`SensorSource`](crate::sensor::SensorSource).
///
/// A read error fails the whole poll; the polling loop logs it and moves on
/// to the next tick.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The backend does not exist on this machine.
    #[error("sensor source unavailable: {0}")]
    Unavailable(String),

    /// A sysfs/procfs path could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other acquisition failure.
    #[error("sensor read failed: {0}")]
    Read(String),
}

/// Caller-facing lifecycle errors of a [`Monitor`](crate::monitor::Monitor).
#[derive(Error, Debug)]
pub enum MonitorError {
    /// `start` was called while a session is active.
    #[error("a monitoring session is already running")]
    AlreadyRunning,

    /// `snapshot` was called before any session was started.
    #[error("no monitoring session has been started")]
    NoSession,

    /// The worker did not finish within the stop bound and was detached.
    #[error("monitoring worker did not stop within {timeout:?}; worker abandoned")]
    ShutdownTimeout { timeout: Duration },

    /// The sampling interval must be greater than zero.
    #[error("sampling interval must be greater than zero")]
    InvalidInterval,

    /// The OS refused to spawn the worker thread.
    #[error("failed to spawn monitoring worker: {0}")]
    Spawn(#[source] std::io::Error),
}
