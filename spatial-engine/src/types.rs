// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Shared types.

use std::error::Error;
use std::fmt;

/// Identifier of a tensor within one compiled task file.
pub type TensorId = i64;

/// Index of a core / network node within the array.
pub type NodeId = usize;

/// A clock cycle.
pub type Cycle = u64;

// Simulation errors

#[macro_export]
/// Build a [SimError](crate::types::SimError) from a format string
macro_rules! sim_error {
    ($($arg:tt)+) => {
        Err($crate::types::SimError(format!($($arg)+)))
    };
}

/// The `SimError` is what should be returned in the case of an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimError(pub String);

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error: {}", self.0)
    }
}

impl Error for SimError {}

/// The SimResult is the return type for most simulation functions
pub type SimResult = Result<(), SimError>;

/// The cycle from which a track may issue again.
///
/// `Unset` means either that the track has never issued or that its head
/// instruction could not complete and must be retried.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReadyMarker {
    #[default]
    Unset,
    At(Cycle),
}

impl ReadyMarker {
    /// True if the marker lies strictly after `cycle`.
    #[must_use]
    pub fn is_after(&self, cycle: Cycle) -> bool {
        matches!(self, ReadyMarker::At(c) if *c > cycle)
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        matches!(self, ReadyMarker::At(_))
    }
}

impl fmt::Display for ReadyMarker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReadyMarker::Unset => write!(f, "-"),
            ReadyMarker::At(c) => write!(f, "{c}"),
        }
    }
}
