//! `hwsampler record`: sample in the background and print the series as JSON.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use hwsampler_core::{
    HwmonSource, Monitor, MonitorConfig, MonitorError, SensorSource, SeriesKey, Snapshot,
};

pub struct RecordCommandConfig {
    pub namespace: PathBuf,
    pub interval: Duration,
    pub duration: Option<Duration>,
    pub verbose: bool,
    pub elevate_priority: bool,
}

/// count/min/mean/max of one series.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SeriesSummary {
    count: usize,
    min: f64,
    mean: f64,
    max: f64,
}

fn summarize(values: &[f64]) -> Option<SeriesSummary> {
    if values.is_empty() {
        return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some(SeriesSummary {
        count: values.len(),
        min,
        mean,
        max,
    })
}

/// Run the record command.
pub fn run(cfg: RecordCommandConfig) {
    let namespace = cfg.namespace.clone();
    let config = MonitorConfig {
        elevate_priority: cfg.elevate_priority,
        ..MonitorConfig::default()
    };
    let mut monitor = Monitor::with_config(
        move || HwmonSource::open(&namespace).map(|s| Box::new(s) as Box<dyn SensorSource>),
        config,
    );

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Error setting Ctrl+C handler: {e}");
        std::process::exit(1);
    }

    eprintln!("Recording hardware telemetry");
    eprintln!("  Namespace: {}", cfg.namespace.display());
    eprintln!("  Interval:  {}ms", cfg.interval.as_millis());
    if let Some(d) = cfg.duration {
        eprintln!("  Duration:  {:.1}s", d.as_secs_f64());
    } else {
        eprintln!("  Duration:  until Ctrl+C");
    }
    eprintln!();

    if let Err(e) = monitor.start(cfg.interval, cfg.verbose) {
        eprintln!("Error starting monitor: {e}");
        std::process::exit(1);
    }

    let start = Instant::now();
    while running.load(Ordering::SeqCst) {
        if let Some(max) = cfg.duration
            && start.elapsed() >= max
        {
            break;
        }
        let polls = monitor.snapshot().map(|s| s.polls()).unwrap_or_default();
        eprint!(
            "\r  Polls: {polls:<8} Elapsed: {:.1}s",
            start.elapsed().as_secs_f64()
        );
        std::thread::sleep(Duration::from_millis(100));
    }
    eprintln!();
    eprintln!();

    let snap = match finish_session(&mut monitor) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error stopping monitor: {e}");
            std::process::exit(1);
        }
    };

    print_summary(&snap);
    print_snapshot(&snap);
}

/// Stop the session and take the final snapshot.
///
/// A worker that misses the stop deadline is left behind; whatever it
/// collected so far is still returned.
fn finish_session(monitor: &mut Monitor) -> Result<Snapshot, MonitorError> {
    match monitor.stop() {
        Ok(()) => {}
        Err(e @ MonitorError::ShutdownTimeout { .. }) => {
            log::warn!("{e}; printing what was collected");
        }
        Err(e) => return Err(e),
    }
    monitor.snapshot()
}

fn print_summary(snap: &Snapshot) {
    eprintln!("{} poll(s) recorded", snap.polls());
    eprintln!(
        "  {:<10} {:>6} {:>9} {:>9} {:>9}",
        "Series", "Count", "Min", "Mean", "Max"
    );
    for key in SeriesKey::ALL {
        match summarize(snap.series(key)) {
            Some(s) => eprintln!(
                "  {:<10} {:>6} {:>9.1} {:>9.1} {:>9.1}",
                key.as_str(),
                s.count,
                s.min,
                s.mean,
                s.max
            ),
            None => eprintln!("  {:<10} {:>6}", key.as_str(), 0),
        }
    }
    eprintln!();
}

fn print_snapshot(snap: &Snapshot) {
    match serde_json::to_string_pretty(snap) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error serializing samples: {e}");
            std::process::exit(1);
        }
    }
}
