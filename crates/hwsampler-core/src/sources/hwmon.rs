//! Linux sensor source built on sysfs and procfs.
//!
//! Readings are named the way hardware-monitor tools name them, so the
//! classifier can route them:
//!
//! - `hwmon/*` temperatures and power rails. CPU package sensors
//!   (`coretemp` "Package id N", `k10temp`/`zenpower` "Tctl") become
//!   `"CPU Package"`; GPU driver chips become `"GPU Core"`, `"GPU Hot Spot"`,
//!   `"GPU Memory"` and `"GPU Power"`. Other chips are reported as
//!   `"<chip> <label>"`.
//! - `/proc/stat` aggregate CPU time becomes `"CPU Total"` load, measured
//!   since the previous read (since boot on the first one).
//! - `powercap/intel-rapl:N` package energy counters become `"CPU Package"`
//!   power, derived from the counter delta; the first read has no value.
//! - `drm/cardN/device/gpu_busy_percent` becomes `"GPU Core"` load.
//!
//! Unreadable individual files are skipped. Only losing the hwmon class
//! directory itself fails a read.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::SourceError;
use crate::sensor::{RawSensorRecord, SensorSource, SensorType};

/// Default procfs mount.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Drivers whose hwmon chip describes a GPU.
const GPU_CHIPS: &[&str] = &["amdgpu", "radeon", "nouveau", "i915", "xe"];

#[derive(Debug, Clone, Copy)]
struct CpuTimes {
    busy: u64,
    total: u64,
}

#[derive(Debug, Clone, Copy)]
struct EnergySample {
    microjoules: f64,
    at: Instant,
}

/// Sensor source reading `<class>/hwmon`, `<class>/powercap`, `<class>/drm`
/// and `<proc>/stat`.
#[derive(Debug)]
pub struct HwmonSource {
    namespace: String,
    class_root: PathBuf,
    proc_root: PathBuf,
    prev_cpu: Option<CpuTimes>,
    prev_energy: HashMap<PathBuf, EnergySample>,
}

impl HwmonSource {
    /// Open against a sysfs class root (normally `/sys/class`) and `/proc`.
    pub fn open(class_root: impl AsRef<Path>) -> Result<Self, SourceError> {
        Self::with_proc_root(class_root, DEFAULT_PROC_ROOT)
    }

    /// Open with an explicit procfs root.
    pub fn with_proc_root(
        class_root: impl AsRef<Path>,
        proc_root: impl AsRef<Path>,
    ) -> Result<Self, SourceError> {
        let class_root = class_root.as_ref().to_path_buf();
        let hwmon = class_root.join("hwmon");
        if !hwmon.is_dir() {
            return Err(SourceError::Unavailable(format!(
                "{} does not exist",
                hwmon.display()
            )));
        }
        Ok(Self {
            namespace: class_root.display().to_string(),
            class_root,
            proc_root: proc_root.as_ref().to_path_buf(),
            prev_cpu: None,
            prev_energy: HashMap::new(),
        })
    }

    fn read_hwmon(&self, out: &mut Vec<RawSensorRecord>) -> Result<(), SourceError> {
        let root = self.class_root.join("hwmon");
        for dir in sorted_entries(&root)? {
            if !dir.is_dir() {
                continue;
            }
            let chip = read_trimmed(&dir.join("name")).unwrap_or_else(|| file_name(&dir));
            let Ok(files) = sorted_entries(&dir) else {
                continue;
            };
            for path in files {
                let fname = file_name(&path);
                let Some(channel) = reading_channel(&fname, &dir) else {
                    continue;
                };
                let Some(raw) = read_f64(&path) else {
                    continue;
                };
                let (sensor_type, value) = scale(&channel, raw);
                let label = read_trimmed(&dir.join(format!("{channel}_label")))
                    .unwrap_or_else(|| channel.clone());
                out.push(RawSensorRecord::new(
                    record_name(&chip, &label, sensor_type),
                    sensor_type,
                    value,
                ));
            }
        }
        Ok(())
    }

    fn read_cpu_load(&mut self, out: &mut Vec<RawSensorRecord>) {
        let Some(times) = read_trimmed(&self.proc_root.join("stat"))
            .as_deref()
            .and_then(parse_cpu_times)
        else {
            return;
        };
        let (busy, total) = match self.prev_cpu {
            Some(prev) if times.total > prev.total => (
                times.busy.saturating_sub(prev.busy),
                times.total - prev.total,
            ),
            _ => (times.busy, times.total),
        };
        self.prev_cpu = Some(times);
        if total == 0 {
            return;
        }
        out.push(RawSensorRecord::new(
            "CPU Total",
            SensorType::Load,
            100.0 * busy as f64 / total as f64,
        ));
    }

    fn read_rapl(&mut self, out: &mut Vec<RawSensorRecord>) {
        let Ok(zones) = sorted_entries(&self.class_root.join("powercap")) else {
            return;
        };
        let now = Instant::now();
        for dir in zones {
            // Top-level zones only: intel-rapl:0, not intel-rapl:0:0.
            let dname = file_name(&dir);
            if !dname.starts_with("intel-rapl:") || dname.matches(':').count() != 1 {
                continue;
            }
            let is_package = read_trimmed(&dir.join("name")).is_some_and(|n| n.starts_with("package"));
            if !is_package {
                continue;
            }
            let Some(microjoules) = read_f64(&dir.join("energy_uj")) else {
                continue;
            };
            let sample = EnergySample { microjoules, at: now };
            let Some(prev) = self.prev_energy.insert(dir.clone(), sample) else {
                continue;
            };
            let secs = now.duration_since(prev.at).as_secs_f64();
            if secs <= 0.0 {
                continue;
            }
            let mut delta = microjoules - prev.microjoules;
            if delta < 0.0 {
                match read_f64(&dir.join("max_energy_range_uj")) {
                    Some(range) => delta += range,
                    None => continue,
                }
            }
            out.push(RawSensorRecord::new(
                "CPU Package",
                SensorType::Power,
                delta / secs / 1_000_000.0,
            ));
        }
    }

    fn read_gpu_busy(&self, out: &mut Vec<RawSensorRecord>) {
        let Ok(cards) = sorted_entries(&self.class_root.join("drm")) else {
            return;
        };
        for dir in cards {
            let dname = file_name(&dir);
            let is_card = dname
                .strip_prefix("card")
                .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
            if !is_card {
                continue;
            }
            if let Some(busy) = read_f64(&dir.join("device").join("gpu_busy_percent")) {
                out.push(RawSensorRecord::new("GPU Core", SensorType::Load, busy));
            }
        }
    }
}

impl SensorSource for HwmonSource {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn read(&mut self) -> Result<Vec<RawSensorRecord>, SourceError> {
        let mut out = Vec::new();
        self.read_hwmon(&mut out)?;
        self.read_cpu_load(&mut out);
        self.read_rapl(&mut out);
        self.read_gpu_busy(&mut out);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// sysfs helpers
// ---------------------------------------------------------------------------

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let entries = std::fs::read_dir(dir).map_err(|source| SourceError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_trimmed(path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    let v = raw.trim();
    if v.is_empty() { None } else { Some(v.to_string()) }
}

fn read_f64(path: &Path) -> Option<f64> {
    read_trimmed(path)?.parse::<f64>().ok()
}

/// Channel name (`temp1`, `power1`, ...) if `fname` is a reading to report.
///
/// `powerN_average` is preferred over `powerN_input` when a chip has both.
fn reading_channel(fname: &str, dir: &Path) -> Option<String> {
    if let Some(channel) = fname.strip_suffix("_average") {
        return channel.starts_with("power").then(|| channel.to_string());
    }
    let channel = fname.strip_suffix("_input")?;
    if channel.starts_with("power") && dir.join(format!("{channel}_average")).exists() {
        return None;
    }
    Some(channel.to_string())
}

/// Convert a raw hwmon value to its unit and sensor type.
fn scale(channel: &str, raw: f64) -> (SensorType, f64) {
    if channel.starts_with("temp") {
        (SensorType::Temperature, raw / 1000.0)
    } else if channel.starts_with("power") {
        (SensorType::Power, raw / 1_000_000.0)
    } else if channel.starts_with("in") || channel.starts_with("curr") {
        (SensorType::Other, raw / 1000.0)
    } else {
        (SensorType::Other, raw)
    }
}

fn record_name(chip: &str, label: &str, sensor_type: SensorType) -> String {
    match chip {
        "coretemp" if label.starts_with("Package id") => "CPU Package".to_string(),
        "k10temp" | "zenpower" if label == "Tctl" => "CPU Package".to_string(),
        "coretemp" | "k10temp" | "zenpower" => format!("CPU {label}"),
        gpu if GPU_CHIPS.contains(&gpu) => match (sensor_type, label) {
            (SensorType::Power, _) => "GPU Power".to_string(),
            (SensorType::Temperature, "edge" | "temp1") => "GPU Core".to_string(),
            (SensorType::Temperature, "junction") => "GPU Hot Spot".to_string(),
            (SensorType::Temperature, "mem") => "GPU Memory".to_string(),
            _ => format!("GPU {label}"),
        },
        _ => format!("{chip} {label}"),
    }
}

/// Busy and total jiffies from the aggregate `cpu` line of `/proc/stat`.
fn parse_cpu_times(raw: &str) -> Option<CpuTimes> {
    let rest = raw.lines().find_map(|l| l.strip_prefix("cpu "))?;
    let fields: Vec<u64> = rest
        .split_whitespace()
        .filter_map(|s| s.parse::<u64>().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }
    // guest and guest_nice are already included in user and nice.
    let total: u64 = fields.iter().take(8).sum();
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CpuTimes {
        busy: total.saturating_sub(idle),
        total,
    })
}
