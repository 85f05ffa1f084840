// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Library functions to build trackers as defined by the user.

use std::fs;
use std::io::{self, BufWriter};
use std::rc::Rc;

use crate::tracker::{DevNullTracker, EntityManager, TextTracker, TrackConfigError};
use crate::{Tracker, Writer};

/// Configuration options for a text tracker.
pub struct TrackerConfig<'a> {
    /// Enable this tracker.
    pub enable: bool,

    /// Set the level at which this tracker should be enabled.
    pub level: log::Level,

    /// A regular expression to match which entities should have this level
    /// applied.
    pub filter_regex: &'a str,

    /// Name of the file to which the tracker will write. `None` or `"-"`
    /// selects `stdout`.
    pub file: Option<&'a str>,
}

impl Default for TrackerConfig<'_> {
    fn default() -> Self {
        Self {
            enable: true,
            level: log::Level::Warn,
            filter_regex: "",
            file: None,
        }
    }
}

fn open_writer(file: Option<&str>) -> Result<Writer, TrackConfigError> {
    match file {
        None | Some("-") => Ok(Box::new(BufWriter::new(io::stdout()))),
        Some(path) => match fs::File::create(path) {
            Ok(f) => Ok(Box::new(BufWriter::new(f))),
            Err(e) => Err(TrackConfigError(format!("Failed to create {path}: {e}"))),
        },
    }
}

/// Create the tracker described by `config`.
///
/// When a filter regular expression is given the configured level only
/// applies to matching entities and all other entities only emit errors.
pub fn setup_tracker(config: &TrackerConfig) -> Result<Tracker, TrackConfigError> {
    if !config.enable {
        return Ok(Rc::new(DevNullTracker));
    }

    let default_level = if config.filter_regex.is_empty() {
        config.level
    } else {
        log::Level::Error
    };

    let mut entity_manager = EntityManager::new(default_level);
    if !config.filter_regex.is_empty() {
        entity_manager.add_entity_level_filter(config.filter_regex, config.level)?;
    }

    let writer = open_writer(config.file)?;
    Ok(Rc::new(TextTracker::new(entity_manager, writer)))
}
