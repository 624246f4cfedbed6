//! Sensor source implementations.

pub mod hwmon;

pub use hwmon::HwmonSource;
