//! # hwsampler-core
//!
//! **Background hardware telemetry, sampled on a fixed interval.**
//!
//! `hwsampler-core` polls CPU and GPU power, load and temperature sensors on
//! a worker thread and accumulates the readings into six named time series
//! plus a running elapsed-time axis.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use hwsampler_core::Monitor;
//!
//! let mut monitor = Monitor::hwmon();
//! monitor.start(Duration::from_secs(1), false)?;
//! std::thread::sleep(Duration::from_secs(5));
//! monitor.stop()?;
//!
//! let snap = monitor.snapshot()?;
//! println!("{} polls, CPU power {:?}", snap.polls(), snap.cpu_power);
//! # Ok::<(), hwsampler_core::MonitorError>(())
//! ```
//!
//! ## Architecture
//!
//! Source → classify → store ← snapshot
//!
//! - A [`SensorSource`] yields raw named readings each poll. [`HwmonSource`]
//!   is the Linux sysfs/procfs backend.
//! - [`classify`] maps each reading to one of the six [`SeriesKey`]s, or
//!   drops it.
//! - The [`PollingLoop`] paces polls and commits each one to the
//!   [`SampleStore`] atomically.
//! - The [`Monitor`] supervises one worker at a time and hands out
//!   [`Snapshot`] copies of the store.

pub mod classify;
pub mod error;
pub mod monitor;
pub mod platform;
pub mod polling;
pub mod sensor;
pub mod sources;
pub mod store;

pub use classify::{SeriesKey, classify, classify_batch};
pub use error::{MonitorError, Result, SourceError};
pub use monitor::{DEFAULT_INTERVAL, DEFAULT_STOP_GRACE, Monitor, MonitorConfig};
pub use polling::{CancelToken, LoopState, LoopStats, PollingLoop};
pub use sensor::{DEFAULT_NAMESPACE, RawSensorRecord, SensorSource, SensorType, SourceFactory};
pub use sources::HwmonSource;
pub use store::{SampleStore, Snapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
