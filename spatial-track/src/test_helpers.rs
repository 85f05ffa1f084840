// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! This module provides helper functions for testing track output
//!
//! The [`TestTracker`] keeps every event in memory so that a test can check
//! the sequence of events emitted by the simulator and then clear them.

use std::cell::{Cell, RefCell};
use std::fs;
use std::io::BufWriter;
use std::path::Path;
use std::rc::Rc;

use regex::Regex;

use crate::tracker::{EntityManager, TextTracker};
use crate::{Id, Track, Tracker, Writer};

/// A tracker that keeps track events.
pub struct TestTracker {
    events: RefCell<Vec<String>>,

    unique_id: Cell<u64>,
}

impl TestTracker {
    /// Create a new [`Tracker`](crate::Tracker) for the tests.
    #[must_use]
    pub fn new(initial_id: u64) -> Self {
        Self {
            events: RefCell::new(Vec::new()),
            unique_id: Cell::new(initial_id),
        }
    }

    fn add_event(&self, event: String) {
        println!("{event}");
        self.events.borrow_mut().push(event);
    }

    /// Return a copy of the events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }
}

impl Track for TestTracker {
    fn unique_id(&self) -> Id {
        let id = self.unique_id.get();
        self.unique_id.set(id + 1);
        Id(id)
    }

    fn is_entity_enabled(&self, _id: Id, _level: log::Level) -> bool {
        true
    }

    fn add_entity(&self, _id: Id, _entity_name: &str) {
        // Do nothing
    }

    fn issue(&self, id: Id, track: usize, instr: &str) {
        self.add_event(format!("{id}: issue t{track} {instr}"));
    }

    fn retire(&self, id: Id, track: usize, instr: &str) {
        self.add_event(format!("{id}: retire t{track} {instr}"));
    }

    fn stall(&self, id: Id, track: usize, instr: &str) {
        self.add_event(format!("{id}: stall t{track} {instr}"));
    }

    fn cycle(&self, set_by: Id, cycle: u64) {
        self.add_event(format!("{set_by}: set cycle to {cycle}"));
    }

    fn log(&self, id: Id, level: log::Level, msg: std::fmt::Arguments) {
        self.add_event(format!("{id}:{level}: {msg}"));
    }

    fn shutdown(&self) {
        // Do nothing
    }
}

/// Initialise a [`TestTracker`] for a test
///
/// Returns both the concrete tracker (for [`check_and_clear`]) and the same
/// tracker as a [`Tracker`](crate::Tracker) to hand to the simulator.
///
/// # Examples
///
/// ```
/// use spatial_track::test_helpers;
///
/// let (test_tracker, tracker) = spatial_track::test_init!(10);
/// let top = spatial_track::entity::toplevel(&tracker, "top");
/// spatial_track::info!(top ; "hello");
/// test_helpers::check_and_clear(&test_tracker, &["10:INFO: hello"]);
/// ```
#[macro_export]
macro_rules! test_init {
    ($start_id:expr) => {{
        let test_tracker = std::rc::Rc::new($crate::test_helpers::TestTracker::new($start_id));
        let tracker: $crate::Tracker = test_tracker.clone();
        (test_tracker, tracker)
    }};
}

/// Check and clear the recorded events
///
/// Asserts that the events seen since the start or the last call match the
/// `expected` regular expressions one-to-one, then clears them.
pub fn check_and_clear(tracker: &TestTracker, expected: &[&str]) {
    let mut events = tracker.events.borrow_mut();

    println!("Checking {:?} matches {:?}", expected, *events);
    assert_eq!(expected.len(), events.len());

    for (i, (log_expect, actual)) in expected.iter().zip(events.iter()).enumerate() {
        let re = Regex::new(log_expect).unwrap();
        println!("Checking {i}: {log_expect:?} matches {actual:?}");
        assert!(re.is_match(actual));
    }

    events.clear();
}

/// Create a tracker for a test which writes to a file named after the test.
///
/// All files are placed in a `traces` folder.
#[must_use]
pub fn create_tracker(full_filepath: &str) -> Tracker {
    const FOLDER: &str = "traces";

    fs::create_dir_all(FOLDER).unwrap();

    let filename_only = Path::new(full_filepath)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap();

    let writer: Writer = Box::new(BufWriter::new(
        fs::File::create(format!("{FOLDER}/{filename_only}.log")).unwrap(),
    ));

    let entity_manager = EntityManager::new(log::Level::Trace);
    let tracker: Tracker = Rc::new(TextTracker::new(entity_manager, writer));
    tracker
}
