// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Configuration of a simulated array.
//!
//! Values are layered in increasing priority: built-in defaults, an optional
//! TOML configuration file, `SPATIAL_*` environment variables and finally
//! the command line (see [`ConfigOverrides`]).

use std::path::{Path, PathBuf};

use clap::Args;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use spatial_engine::sim_error;
use spatial_engine::types::SimError;
use spatial_engine::units::network_interface::DeliveryMode;

/// Prefix of environment variables that set configuration values.
pub const ENV_PREFIX: &str = "SPATIAL_";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayConfig {
    /// Number of cores (and network nodes) in the array.
    pub array_size: usize,

    /// Directory holding the task files.
    pub task_dir: PathBuf,

    pub task_files: Vec<String>,

    /// Core `i` runs `task_files[assigned_tasks[i]]`. When empty, core `i`
    /// runs `task_files[i]`.
    pub assigned_tasks: Vec<usize>,

    pub latency_file: PathBuf,

    /// Routing board. A missing file leaves the routing table empty.
    pub routing_file: PathBuf,

    /// A node advertises credit while its inbound queue holds at most this
    /// many packets.
    pub threshold: usize,

    /// Tensor elements per transfer unit.
    pub channel_width: usize,

    pub delivery: DeliveryMode,

    pub cycles_per_hop: u64,

    /// Cycles between whole-array deadlock checks. 0 disables the check.
    pub deadlock_check_interval: u64,

    /// Stop after this many cycles. 0 runs until finished or deadlocked.
    pub max_cycles: u64,

    /// Arbitration seed; core `i` uses `seed + i`.
    pub seed: u64,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            array_size: 4,
            task_dir: PathBuf::from("tasks"),
            task_files: Vec::new(),
            assigned_tasks: Vec::new(),
            latency_file: PathBuf::from("latency.txt"),
            routing_file: PathBuf::from("routing.txt"),
            threshold: 2,
            channel_width: 128,
            delivery: DeliveryMode::Unicast,
            cycles_per_hop: 1,
            deadlock_check_interval: 1000,
            max_cycles: 0,
            seed: 0,
        }
    }
}

/// Check that an explicitly requested configuration file can be read.
pub fn check_conf_file(conf_file: &Path) -> Result<(), std::io::Error> {
    if conf_file.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::IsADirectory,
            format!("{} is not a file path", conf_file.display()),
        ));
    }

    if !conf_file.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} not found", conf_file.display()),
        ));
    }
    Ok(())
}

impl ArrayConfig {
    /// Defaults, then `conf_file`, then the environment.
    #[must_use]
    pub fn figment(conf_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(ArrayConfig::default()));
        if let Some(conf_file) = conf_file {
            figment = figment.merge(Toml::file(conf_file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn load(conf_file: Option<&Path>) -> Result<Self, SimError> {
        if let Some(conf_file) = conf_file {
            check_conf_file(conf_file).map_err(|e| SimError(e.to_string()))?;
        }
        Self::figment(conf_file)
            .extract()
            .map_err(|e| SimError(format!("invalid configuration: {e}")))
    }

    /// Path of the task file run by `core`.
    pub fn task_path(&self, core: usize) -> Result<PathBuf, SimError> {
        let index = if self.assigned_tasks.is_empty() {
            core
        } else {
            match self.assigned_tasks.get(core) {
                Some(index) => *index,
                None => return sim_error!("no task assigned to core {core}"),
            }
        };
        match self.task_files.get(index) {
            Some(file) => Ok(self.task_dir.join(file)),
            None => sim_error!("no task file {index} for core {core}"),
        }
    }
}

/// Command-line values that take priority over every other source.
#[derive(Args, Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Number of cores in the array.
    #[arg(long)]
    pub array_size: Option<usize>,

    /// Directory holding the task files.
    #[arg(long)]
    pub task_dir: Option<PathBuf>,

    /// Comma-separated task file names.
    #[arg(long, value_delimiter = ',')]
    pub task_files: Option<Vec<String>>,

    /// Comma-separated index into `task_files` for each core.
    #[arg(long, value_delimiter = ',')]
    pub assigned_tasks: Option<Vec<usize>>,

    /// Latency table file.
    #[arg(long)]
    pub latency_file: Option<PathBuf>,

    /// Routing board file.
    #[arg(long)]
    pub routing_file: Option<PathBuf>,

    /// Inbound queue length up to which a node accepts packets.
    #[arg(long)]
    pub threshold: Option<usize>,

    /// Tensor elements per transfer unit.
    #[arg(long)]
    pub channel_width: Option<usize>,

    /// `unicast` or `multicast`.
    #[arg(long)]
    pub delivery: Option<DeliveryMode>,

    /// Latency of one network hop.
    #[arg(long)]
    pub cycles_per_hop: Option<u64>,

    /// Cycles between deadlock checks (0 disables them).
    #[arg(long)]
    pub deadlock_check_interval: Option<u64>,

    /// Stop after this many cycles (0 runs to completion).
    #[arg(long)]
    pub max_cycles: Option<u64>,

    /// Seed for track arbitration.
    #[arg(long)]
    pub seed: Option<u64>,
}

macro_rules! override_fields {
    ($overrides:expr, $config:expr ; $($field:ident),+) => {
        $(
            if let Some(value) = $overrides.$field {
                $config.$field = value;
            }
        )+
    };
}

impl ConfigOverrides {
    /// Replace every value of `config` given on the command line.
    pub fn apply(self, config: &mut ArrayConfig) {
        override_fields!(self, config ;
            array_size, task_dir, task_files, assigned_tasks, latency_file,
            routing_file, threshold, channel_width, delivery, cycles_per_hop,
            deadlock_check_interval, max_cycles, seed);
    }
}
