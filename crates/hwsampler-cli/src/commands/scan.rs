//! `hwsampler scan`: read every sensor once and show how it is classified.

use std::path::Path;

use hwsampler_core::{HwmonSource, SensorSource, classify};

pub fn run(namespace: &Path, proc: &Path, json: bool) {
    let mut source = match HwmonSource::with_proc_root(namespace, proc) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let records = match source.read() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error reading sensors: {e}");
            std::process::exit(1);
        }
    };

    if json {
        match serde_json::to_string_pretty(&records) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Error serializing records: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    println!("Namespace: {}", source.namespace());
    println!();
    println!("Found {} sensor reading(s):\n", records.len());
    println!(
        "  {:<28} {:<12} {:>10}  {}",
        "Name", "Type", "Value", "Series"
    );
    for record in &records {
        let series = classify(record).map_or_else(|| "-".to_string(), |(key, v)| format!("{key} = {v}"));
        println!(
            "  {:<28} {:<12} {:>10.2}  {}",
            record.name,
            record.sensor_type.to_string(),
            record.value,
            series
        );
    }

    if records.is_empty() {
        println!("  (none found)");
    }
    println!();
    println!("Load and energy-derived power need two reads; `record` reports them every poll.");
}
