// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! This crate provides combined _track_ capabilities for the spatial array
//! simulator.
//!
//! _Track_ means the combination of _log_ and _trace_ where:
//!
//!   - _log_ are text-based human-readable messages emitted at various levels
//!     of verbosity (from `Trace` through to `Error`).
//!   - _trace_ provides a small set of simulation events: micro-instructions
//!     being issued to a functional unit, retired from a track, or stalled
//!     waiting on the network, and the clock advancing.
//!
//! Every event is emitted on behalf of an [`Entity`](crate::entity::Entity)
//! so that output can be filtered by the hierarchical entity name (for
//! example `top::core3::ni`).

// Enable warnings for missing documentation
#![warn(missing_docs)]

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub use log;

pub mod builder;
pub mod entity;
pub mod test_helpers;

/// Include the trackers.
pub mod tracker;
pub use tracker::{Track, Tracker};

/// A type alias for objects that receive _log_ / _trace_ events.
pub type Writer = Box<dyn std::io::Write>;
type SharedWriter = Rc<RefCell<Writer>>;

/// Identifier that is unique across the simulation
///
/// Each entity within the application is given a unique ID which is emitted
/// with every event. There are two reserved values: [NO_ID](constant.NO_ID.html)
/// and [ROOT](constant.ROOT.html)
#[derive(Copy, Clone, Default, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct Id(pub u64);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ID value which indicates where there is no valid entity
pub const NO_ID: Id = Id(0);

/// The root ID from which all other IDs are derived
pub const ROOT: Id = Id(1);

/// Track a micro-instruction being issued to a functional unit.
#[macro_export]
macro_rules! issue {
    ($entity:expr ; $track:expr, $instr:expr) => {{
        if $entity
            .tracker
            .is_entity_enabled($entity.id, log::Level::Debug)
        {
            $entity
                .tracker
                .issue($entity.id, $track, format!("{}", $instr).as_str());
        }
    }};
}

/// Track a completed micro-instruction leaving the head of its track.
#[macro_export]
macro_rules! retire {
    ($entity:expr ; $track:expr, $instr:expr) => {{
        if $entity
            .tracker
            .is_entity_enabled($entity.id, log::Level::Debug)
        {
            $entity
                .tracker
                .retire($entity.id, $track, format!("{}", $instr).as_str());
        }
    }};
}

/// Track a micro-instruction that could not complete and will be retried.
#[macro_export]
macro_rules! stall {
    ($entity:expr ; $track:expr, $instr:expr) => {{
        if $entity
            .tracker
            .is_entity_enabled($entity.id, log::Level::Trace)
        {
            $entity
                .tracker
                .stall($entity.id, $track, format!("{}", $instr).as_str());
        }
    }};
}

/// Update the current clock cycle.
#[macro_export]
macro_rules! set_cycle {
    ($entity:expr ; $cycle:expr) => {{
        if $entity
            .tracker
            .is_entity_enabled($entity.id, log::Level::Trace)
        {
            $entity.tracker.cycle($entity.id, $cycle);
        }
    }};
}

/// Base macro for log messages of all level.
///
/// Checks whether the entity has the level enabled before the message is
/// formatted and passed on to the [`Track::log`] function.
#[macro_export]
macro_rules! log_base {
    ($entity:expr ; $lvl:expr, $($arg:tt)+) => (
        if $entity.tracker.is_entity_enabled($entity.id, $lvl) {
            $entity.tracker.log($entity.id, $lvl, format_args!($($arg)+));
        }
    );
}

/// The `trace` macro emits a message at level `log::Level::Trace`
#[macro_export]
macro_rules! trace {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; log::Level::Trace, $($arg)+);
    );
}

/// The `debug` macro emits a message at level `log::Level::Debug`
#[macro_export]
macro_rules! debug {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; log::Level::Debug, $($arg)+);
    );
}

/// The `info` macro emits a message at level `log::Level::Info`
#[macro_export]
macro_rules! info {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; log::Level::Info, $($arg)+);
    );
}

/// The `warn` macro emits a message at level `log::Level::Warn`
#[macro_export]
macro_rules! warn {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; log::Level::Warn, $($arg)+);
    );
}

/// the `error` macro emits a message at level `log::Level::Error`
#[macro_export]
macro_rules! error {
    ($entity:expr ; $($arg:tt)+) => (
        $crate::log_base!($entity ; log::Level::Error, $($arg)+);
    );
}
