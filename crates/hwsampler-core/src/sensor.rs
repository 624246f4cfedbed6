//! Sensor source trait and the raw records it produces.
//!
//! Every backend implements the [`SensorSource`] trait. The polling worker
//! builds its source through a [`SourceFactory`] so the backend is initialised
//! on the worker thread, never on the caller's.

use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// Namespace the default backend is opened against (sysfs class root).
pub const DEFAULT_NAMESPACE: &str = "/sys/class";

/// Kind of quantity a sensor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorType {
    /// Watts.
    Power,
    /// Percent utilisation.
    Load,
    /// Degrees Celsius.
    Temperature,
    /// Anything the classifier ignores (fans, voltages, clocks...).
    Other,
}

impl SensorType {
    /// Parse a hardware-monitor type string. Unknown names map to `Other`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Power" => Self::Power,
            "Load" => Self::Load,
            "Temperature" => Self::Temperature,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for SensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Power => write!(f, "Power"),
            Self::Load => write!(f, "Load"),
            Self::Temperature => write!(f, "Temperature"),
            Self::Other => write!(f, "Other"),
        }
    }
}

/// One reading as reported by the backend. Transient; never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSensorRecord {
    pub name: String,
    pub sensor_type: SensorType,
    pub value: f64,
}

impl RawSensorRecord {
    pub fn new(name: impl Into<String>, sensor_type: SensorType, value: f64) -> Self {
        Self {
            name: name.into(),
            sensor_type,
            value,
        }
    }
}

/// A backend that returns the full current set of sensor readings on demand.
pub trait SensorSource: Send {
    /// Identifier the source was opened against, used in log lines.
    fn namespace(&self) -> &str;

    /// Read every sensor the backend currently exposes.
    fn read(&mut self) -> Result<Vec<RawSensorRecord>, SourceError>;
}

/// Builds a sensor source. Called once, on the worker thread, at worker start.
pub type SourceFactory =
    std::sync::Arc<dyn Fn() -> Result<Box<dyn SensorSource>, SourceError> + Send + Sync>;
