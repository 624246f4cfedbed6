//! Routing of raw sensor records into the fixed set of series.
//!
//! Matching is by substring on the sensor name, in this precedence:
//!
//! 1. `"CPU Package"` or `"CPU Total"`: CPU power, load and temperature.
//! 2. `"GPU"`: any GPU power rail and temperature; load only for `"GPU Core"`
//!    (memory controller and video engine load rails are ignored).
//! 3. Everything else is dropped.
//!
//! Values are rounded to one decimal place first; load values are then
//! truncated to whole percent.

use serde::{Deserialize, Serialize};

use crate::sensor::{RawSensorRecord, SensorType};

/// One of the recognised series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SeriesKey {
    #[serde(rename = "CPU_Power")]
    CpuPower,
    #[serde(rename = "CPU_Usage")]
    CpuUsage,
    #[serde(rename = "CPU_Temp")]
    CpuTemp,
    #[serde(rename = "GPU_Power")]
    GpuPower,
    #[serde(rename = "GPU_Usage")]
    GpuUsage,
    #[serde(rename = "GPU_Temp")]
    GpuTemp,
}

impl SeriesKey {
    /// Every key, in snapshot order.
    pub const ALL: [SeriesKey; 6] = [
        Self::CpuPower,
        Self::CpuUsage,
        Self::CpuTemp,
        Self::GpuPower,
        Self::GpuUsage,
        Self::GpuTemp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CpuPower => "CPU_Power",
            Self::CpuUsage => "CPU_Usage",
            Self::CpuTemp => "CPU_Temp",
            Self::GpuPower => "GPU_Power",
            Self::GpuUsage => "GPU_Usage",
            Self::GpuTemp => "GPU_Temp",
        }
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round to one decimal place.
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Classify a single record. `None` means the record is not recognised.
///
/// Never fails: non-finite values are treated as malformed and dropped.
pub fn classify(record: &RawSensorRecord) -> Option<(SeriesKey, f64)> {
    if !record.value.is_finite() {
        return None;
    }
    let value = round1(record.value);
    let name = record.name.as_str();

    if name.contains("CPU Package") || name.contains("CPU Total") {
        match record.sensor_type {
            SensorType::Power => Some((SeriesKey::CpuPower, value)),
            SensorType::Load => Some((SeriesKey::CpuUsage, value.trunc())),
            SensorType::Temperature => Some((SeriesKey::CpuTemp, value)),
            SensorType::Other => None,
        }
    } else if name.contains("GPU") {
        match record.sensor_type {
            SensorType::Power => Some((SeriesKey::GpuPower, value)),
            SensorType::Load if name.contains("GPU Core") => {
                Some((SeriesKey::GpuUsage, value.trunc()))
            }
            SensorType::Temperature => Some((SeriesKey::GpuTemp, value)),
            _ => None,
        }
    } else {
        None
    }
}

/// Classify one poll's worth of records, keeping only recognised ones.
pub fn classify_batch(records: &[RawSensorRecord]) -> Vec<(SeriesKey, f64)> {
    records.iter().filter_map(classify).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str, sensor_type: SensorType, value: f64) -> RawSensorRecord {
        RawSensorRecord::new(name, sensor_type, value)
    }

    #[test]
    fn cpu_package_power_is_rounded_not_truncated() {
        let got = classify(&rec("CPU Package", SensorType::Power, 45.26));
        assert_eq!(got, Some((SeriesKey::CpuPower, 45.3)));
    }

    #[test]
    fn cpu_total_load_is_truncated() {
        let got = classify(&rec("CPU Total", SensorType::Load, 37.96));
        // 37.96 rounds to 38.0 first, then truncates.
        assert_eq!(got, Some((SeriesKey::CpuUsage, 38.0)));
        let got = classify(&rec("CPU Total", SensorType::Load, 37.94));
        assert_eq!(got, Some((SeriesKey::CpuUsage, 37.0)));
    }

    #[test]
    fn cpu_package_temperature() {
        let got = classify(&rec("CPU Package", SensorType::Temperature, 61.04));
        assert_eq!(got, Some((SeriesKey::CpuTemp, 61.0)));
    }

    #[test]
    fn cpu_other_type_is_dropped() {
        assert_eq!(classify(&rec("CPU Package", SensorType::Other, 1.0)), None);
    }

    #[test]
    fn cpu_core_sensors_are_not_recognised() {
        assert_eq!(classify(&rec("CPU Core #1", SensorType::Temperature, 55.0)), None);
        assert_eq!(classify(&rec("CPU Core #1", SensorType::Load, 12.0)), None);
    }

    #[test]
    fn gpu_core_load_is_integer_usage() {
        let got = classify(&rec("GPU Core", SensorType::Load, 87.65));
        assert_eq!(got, Some((SeriesKey::GpuUsage, 87.0)));
    }

    #[test]
    fn gpu_memory_load_is_ignored() {
        assert_eq!(classify(&rec("GPU Memory", SensorType::Load, 40.0)), None);
        assert_eq!(
            classify(&rec("GPU Video Engine", SensorType::Load, 3.0)),
            None
        );
    }

    #[test]
    fn any_gpu_power_rail_counts() {
        assert_eq!(
            classify(&rec("GPU Power", SensorType::Power, 120.04)),
            Some((SeriesKey::GpuPower, 120.0))
        );
        assert_eq!(
            classify(&rec("GPU Memory Power", SensorType::Power, 8.25)),
            Some((SeriesKey::GpuPower, 8.3))
        );
    }

    #[test]
    fn gpu_temperature() {
        assert_eq!(
            classify(&rec("GPU Hot Spot", SensorType::Temperature, 71.0)),
            Some((SeriesKey::GpuTemp, 71.0))
        );
    }

    #[test]
    fn cpu_rule_takes_precedence_over_gpu() {
        // A name matching both rules is routed by the CPU rule.
        let got = classify(&rec("CPU Package (GPU shared)", SensorType::Power, 10.0));
        assert_eq!(got, Some((SeriesKey::CpuPower, 10.0)));
    }

    #[test]
    fn unrelated_names_are_dropped() {
        assert_eq!(classify(&rec("Fan #1", SensorType::Other, 1200.0)), None);
        assert_eq!(classify(&rec("Memory", SensorType::Load, 60.0)), None);
        assert_eq!(classify(&rec("", SensorType::Power, 60.0)), None);
    }

    #[test]
    fn non_finite_values_are_dropped() {
        assert_eq!(classify(&rec("CPU Package", SensorType::Power, f64::NAN)), None);
        assert_eq!(
            classify(&rec("GPU Core", SensorType::Load, f64::INFINITY)),
            None
        );
    }

    #[test]
    fn batch_keeps_order_and_skips_unknown() {
        let records = vec![
            rec("CPU Package", SensorType::Power, 45.3),
            rec("GPU Memory", SensorType::Load, 10.0),
            rec("GPU Core", SensorType::Temperature, 50.0),
            rec("CPU Total", SensorType::Load, 20.5),
        ];
        let got = classify_batch(&records);
        assert_eq!(
            got,
            vec![
                (SeriesKey::CpuPower, 45.3),
                (SeriesKey::GpuTemp, 50.0),
                (SeriesKey::CpuUsage, 20.0),
            ]
        );
    }

    #[test]
    fn series_key_names() {
        let names: Vec<&str> = SeriesKey::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(
            names,
            ["CPU_Power", "CPU_Usage", "CPU_Temp", "GPU_Power", "GPU_Usage", "GPU_Temp"]
        );
        assert_eq!(SeriesKey::GpuUsage.to_string(), "GPU_Usage");
    }
}
