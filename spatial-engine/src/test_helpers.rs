// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Helpers shared by the unit and integration tests.

use std::collections::VecDeque;
use std::rc::Rc;

use spatial_track::entity::{Entity, toplevel};
use spatial_track::test_helpers::create_tracker;

use crate::instruction::MicroInstruction;
use crate::latency::LatencyTable;

/// Latencies used by the tests.
pub const TEST_LATENCIES: &str = "\
BUS.trans 1
CPU.reshape 3
CPU.poll 2
CPU.sleep 1
ACC.cal 4
BUFFER.read 1
BUFFER.write 1
";

/// Create the top-level entity of a test, logging to a file named after it.
#[must_use]
pub fn start_test(full_filepath: &str) -> Rc<Entity> {
    let tracker = create_tracker(full_filepath);
    toplevel(&tracker, "top")
}

#[must_use]
pub fn latency_table() -> Rc<LatencyTable> {
    Rc::new(LatencyTable::from_string(TEST_LATENCIES).unwrap())
}

/// Parse a track of micro-instructions, one per line.
#[must_use]
pub fn track(lines: &[&str]) -> VecDeque<MicroInstruction> {
    lines.iter().map(|l| l.parse().unwrap()).collect()
}
