//! Shared, append-only sample storage.
//!
//! A [`SampleStore`] is shared between the polling worker (sole writer) and
//! the monitor (reader). Readers only ever get a [`Snapshot`], a full copy.
//! [`SampleStore::record_poll`] commits one poll under a single lock so no
//! snapshot can observe half of it.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::classify::SeriesKey;

/// Immutable copy of every series plus elapsed time.
///
/// Series are appended only when a poll produced a value for them, so their
/// lengths may differ from each other and from `elapsed_time`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "CPU_Power")]
    pub cpu_power: Vec<f64>,
    #[serde(rename = "CPU_Usage")]
    pub cpu_usage: Vec<f64>,
    #[serde(rename = "CPU_Temp")]
    pub cpu_temp: Vec<f64>,
    #[serde(rename = "GPU_Power")]
    pub gpu_power: Vec<f64>,
    #[serde(rename = "GPU_Usage")]
    pub gpu_usage: Vec<f64>,
    #[serde(rename = "GPU_Temp")]
    pub gpu_temp: Vec<f64>,
    /// Accumulated seconds since monitoring start, one entry per completed poll.
    #[serde(rename = "ElapsedTime")]
    pub elapsed_time: Vec<f64>,
}

impl Snapshot {
    /// Samples of one series.
    pub fn series(&self, key: SeriesKey) -> &[f64] {
        match key {
            SeriesKey::CpuPower => &self.cpu_power,
            SeriesKey::CpuUsage => &self.cpu_usage,
            SeriesKey::CpuTemp => &self.cpu_temp,
            SeriesKey::GpuPower => &self.gpu_power,
            SeriesKey::GpuUsage => &self.gpu_usage,
            SeriesKey::GpuTemp => &self.gpu_temp,
        }
    }

    fn series_mut(&mut self, key: SeriesKey) -> &mut Vec<f64> {
        match key {
            SeriesKey::CpuPower => &mut self.cpu_power,
            SeriesKey::CpuUsage => &mut self.cpu_usage,
            SeriesKey::CpuTemp => &mut self.cpu_temp,
            SeriesKey::GpuPower => &mut self.gpu_power,
            SeriesKey::GpuUsage => &mut self.gpu_usage,
            SeriesKey::GpuTemp => &mut self.gpu_temp,
        }
    }

    pub fn elapsed_time(&self) -> &[f64] {
        &self.elapsed_time
    }

    /// Number of polls that completed (one elapsed-time entry each).
    pub fn polls(&self) -> usize {
        self.elapsed_time.len()
    }

    /// True when nothing at all has been recorded.
    pub fn is_empty(&self) -> bool {
        self.elapsed_time.is_empty() && SeriesKey::ALL.iter().all(|k| self.series(*k).is_empty())
    }
}

/// Thread-safe container behind the append/snapshot interface.
#[derive(Debug, Default)]
pub struct SampleStore {
    inner: Mutex<Snapshot>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation finishes before the guard drops, so a poisoned lock still
    // holds consistent data.
    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one value to a series.
    pub fn append(&self, key: SeriesKey, value: f64) {
        self.lock().series_mut(key).push(value);
    }

    /// Append one value to the elapsed-time series.
    pub fn append_elapsed(&self, value: f64) {
        self.lock().elapsed_time.push(value);
    }

    /// Commit a whole poll: its samples plus the next elapsed-time entry.
    ///
    /// The new elapsed entry is the previous entry plus `dt_secs` (or just
    /// `dt_secs` for the first poll). Returns that entry.
    pub fn record_poll(&self, samples: &[(SeriesKey, f64)], dt_secs: f64) -> f64 {
        let mut guard = self.lock();
        for &(key, value) in samples {
            guard.series_mut(key).push(value);
        }
        let elapsed = guard.elapsed_time.last().map_or(dt_secs, |last| last + dt_secs);
        guard.elapsed_time.push(elapsed);
        elapsed
    }

    /// Copy every series out.
    pub fn snapshot(&self) -> Snapshot {
        self.lock().clone()
    }

    /// Number of completed polls recorded so far.
    pub fn polls(&self) -> usize {
        self.lock().elapsed_time.len()
    }
}
