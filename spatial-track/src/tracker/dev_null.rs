// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use crate::tracker::Track;
use crate::{Id, NO_ID};

/// A tracker that does nothing.
///
/// Useful when running large arrays where the cost of formatting events
/// would dominate.
pub struct DevNullTracker;

impl Track for DevNullTracker {
    fn unique_id(&self) -> Id {
        NO_ID
    }

    fn is_entity_enabled(&self, _id: Id, _level: log::Level) -> bool {
        false
    }
    fn add_entity(&self, _id: Id, _entity_name: &str) {}
    fn issue(&self, _issued_by: Id, _track: usize, _instr: &str) {}
    fn retire(&self, _retired_by: Id, _track: usize, _instr: &str) {}
    fn stall(&self, _stalled_by: Id, _track: usize, _instr: &str) {}
    fn cycle(&self, _set_by: Id, _cycle: u64) {}
    fn log(&self, _msg_by: Id, _level: log::Level, _msg: std::fmt::Arguments) {}
    fn shutdown(&self) {}
}
