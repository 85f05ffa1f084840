// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The execution engine of one core of a spatial accelerator array.
//!
//! A core owns a fixed set of functional units (bus, scalar CPU, accelerator,
//! scratch buffer and network interface) and a number of parallel _tracks_,
//! each an ordered queue of [micro-instructions](instruction::MicroInstruction).
//! The [`CoreScheduler`](scheduler::CoreScheduler) is advanced one clock tick at a
//! time and issues at most one micro-instruction per tick.
//!
//! Units that cannot make progress (a send whose destinations have no credit,
//! a receive whose packet has not arrived) report
//! [`Outcome::NotYet`](units::Outcome::NotYet) and the instruction is retried
//! on a later tick.

pub mod instruction;
pub mod latency;
pub mod packet;
pub mod routing;
pub mod scheduler;
pub mod tensor;
pub mod test_helpers;
pub mod types;
pub mod units;
