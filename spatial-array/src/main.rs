// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Command-line front-end that runs task files on a spatial array.
//!
//! For example, run using:
//!   cargo run --bin spatial-sim -- --task-dir tasks --task-files
//! t0.txt,t1.txt,t2.txt,t3.txt --stdout --stdout-level debug

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use indicatif::ProgressBar;
use spatial_array::SpatialArray;
use spatial_array::config::{ArrayConfig, ConfigOverrides};
use spatial_track::Tracker;
use spatial_track::builder::{TrackerConfig, setup_tracker};
use spatial_track::entity::toplevel;

/// Command-line arguments.
#[derive(Parser)]
#[command(about = "Simulate task files running on a spatial accelerator array")]
struct Cli {
    /// Enable logging to the console.
    #[arg(long, default_value = "false")]
    stdout: bool,

    /// Level of log message to display.
    #[arg(long, default_value = "Info")]
    stdout_level: log::Level,

    /// Set a regular expression for which entites should have logging level set
    /// to `--stdout-level`. Others will have level set to `Error`.
    #[arg(long, default_value = "")]
    stdout_filter_regex: String,

    /// Write the log to this file instead of the console.
    #[arg(long)]
    log_file: Option<String>,

    /// Path to a TOML configuration file.
    #[arg(long)]
    conf_file: Option<PathBuf>,

    /// Print the state of every core when the run ends.
    #[arg(long)]
    stats: bool,

    /// Show a progress bar of retired instructions.
    #[arg(long)]
    progress: bool,

    /// Number of cycles between updates to the progress bar.
    #[arg(long, default_value = "1000")]
    progress_ticks: u64,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

fn build_tracker(args: &Cli) -> Result<Tracker> {
    let config = TrackerConfig {
        enable: args.stdout || args.log_file.is_some(),
        level: args.stdout_level,
        filter_regex: &args.stdout_filter_regex,
        file: args.log_file.as_deref(),
    };
    Ok(setup_tracker(&config)?)
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let tracker = build_tracker(&args)?;

    let mut config = ArrayConfig::load(args.conf_file.as_deref())?;
    args.overrides.clone().apply(&mut config);

    let top = toplevel(&tracker, "top");
    let mut array = SpatialArray::new(&top, config)?;
    println!(
        "Loaded {} cores with {} micro-instructions",
        array.cores().len(),
        array.pending_instructions()
    );

    let result = if args.progress {
        let total = array.pending_instructions() as u64;
        let progress_bar = ProgressBar::new(total);
        let progress_ticks = args.progress_ticks.max(1);
        let result = array.run_with(|array| {
            if array.cycle() % progress_ticks == 0 {
                progress_bar.set_position(total - array.pending_instructions() as u64);
            }
        });
        progress_bar.finish();
        result
    } else {
        array.run()
    };
    tracker.shutdown();
    result?;

    println!("Ran simulation. Cycle now {}", array.cycle());
    for core in array.cores() {
        println!(
            "core {}: busy {} cycles, idle {} cycles",
            core.node(),
            core.busy_cycles(),
            core.idle_cycles()
        );
    }

    if args.stats {
        array.write_stats(&mut std::io::stdout())?;
    }
    Ok(())
}
