//! CLI for hwsampler: record CPU and GPU power, load and temperature series.

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use hwsampler_core::DEFAULT_NAMESPACE;
use hwsampler_core::sources::hwmon::DEFAULT_PROC_ROOT;

#[derive(Parser)]
#[command(name = "hwsampler")]
#[command(about = "hwsampler: background CPU/GPU power, load and temperature sampling")]
#[command(version = hwsampler_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read every sensor once and show how each reading is classified
    Scan {
        /// sysfs class root to read hwmon, powercap and drm from
        #[arg(long, default_value = DEFAULT_NAMESPACE)]
        namespace: PathBuf,

        /// procfs root used for CPU load
        #[arg(long, default_value = DEFAULT_PROC_ROOT)]
        proc: PathBuf,

        /// Print the raw records as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Sample in the background until Ctrl+C or --duration, then print the series as JSON
    Record {
        /// Sampling interval, e.g. "1s", "500ms", "0.25s"
        #[arg(long, default_value = "1s", value_parser = commands::parse_duration)]
        interval: Duration,

        /// Stop after this long (e.g. "30s", "5m"). Default: until Ctrl+C
        #[arg(long, value_parser = commands::parse_duration)]
        duration: Option<Duration>,

        /// sysfs class root to read hwmon, powercap and drm from
        #[arg(long, default_value = DEFAULT_NAMESPACE)]
        namespace: PathBuf,

        /// Log session lifecycle events
        #[arg(long, short)]
        verbose: bool,

        /// Do not try to raise the worker thread's scheduling priority
        #[arg(long)]
        no_priority: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            namespace,
            proc,
            json,
        } => commands::scan::run(&namespace, &proc, json),
        Commands::Record {
            interval,
            duration,
            namespace,
            verbose,
            no_priority,
        } => commands::record::run(commands::record::RecordCommandConfig {
            namespace,
            interval,
            duration,
            verbose,
            elevate_priority: !no_priority,
        }),
    }
}
