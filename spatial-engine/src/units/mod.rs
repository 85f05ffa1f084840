// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The functional units of a core.
//!
//! Every micro-instruction is addressed to a unit by name (`BUS`, `CPU`,
//! `ACC`, `BUFFER` or `NI`). Each unit implements [`Simulate`] which returns
//! the cycle at which the instruction completes, or [`Outcome::NotYet`] if
//! it cannot make progress this cycle.

use std::fmt;
use std::rc::Rc;

use spatial_track::entity::Entity;
use spatial_track::error;

use crate::instruction::MicroInstruction;
use crate::latency::LatencyTable;
use crate::sim_error;
use crate::tensor::TensorTable;
use crate::types::{Cycle, ReadyMarker, SimError};

pub mod accelerator;
pub mod buffer;
pub mod bus;
pub mod cpu;
pub mod network_interface;

use accelerator::Accelerator;
use buffer::Buffer;
use bus::Bus;
use cpu::Cpu;
use network_interface::NetworkInterface;

pub const BUS: &str = "BUS";
pub const CPU: &str = "CPU";
pub const ACC: &str = "ACC";
pub const BUFFER: &str = "BUFFER";
pub const NI: &str = "NI";

/// Names of all units of a core, in the order they are searched.
pub const COMPONENTS: [&str; 5] = [BUS, CPU, ACC, BUFFER, NI];

/// Result of handing an instruction to a unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The instruction completes at the given cycle.
    Complete(Cycle),

    /// The instruction cannot proceed yet and must be retried.
    NotYet,
}

impl From<Outcome> for ReadyMarker {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Complete(cycle) => ReadyMarker::At(cycle),
            Outcome::NotYet => ReadyMarker::Unset,
        }
    }
}

/// The timing model of a functional unit.
pub trait Simulate {
    /// Start `instr` at `cycle`.
    fn simulate(
        &mut self,
        instr: &MicroInstruction,
        tensors: &mut TensorTable,
        cycle: Cycle,
    ) -> Result<Outcome, SimError>;
}

/// Completion cycle of `work` cycles started at `cycle`.
///
/// Fractional cycles are truncated.
#[must_use]
pub fn complete_after(cycle: Cycle, work: f64) -> Outcome {
    Outcome::Complete(cycle + work as Cycle)
}

/// Latency lookup for one unit.
#[derive(Clone)]
pub struct UnitCosts {
    component: &'static str,
    latency: Rc<LatencyTable>,
}

impl UnitCosts {
    #[must_use]
    pub fn new(component: &'static str, latency: &Rc<LatencyTable>) -> Self {
        Self {
            component,
            latency: latency.clone(),
        }
    }

    /// The cost of `instr`. An opcode without an entry cannot be executed.
    pub fn cost(&self, entity: &Entity, instr: &MicroInstruction) -> Result<f64, SimError> {
        match self.latency.cost(self.component, &instr.opcode) {
            Some(cost) => Ok(cost),
            None => Err(cannot_execute(entity, self.component, instr)),
        }
    }

    /// The cost of `instr` interpreted as a throughput.
    pub fn rate(&self, entity: &Entity, instr: &MicroInstruction) -> Result<f64, SimError> {
        let rate = self.cost(entity, instr)?;
        if rate <= 0.0 {
            error!(entity ; "{} has no throughput for {instr}", self.component);
            return sim_error!("{} has no throughput for {instr}", self.component);
        }
        Ok(rate)
    }
}

impl fmt::Display for UnitCosts {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let entries: Vec<String> = self
            .latency
            .entries(self.component)
            .map(|(opcode, cost)| format!("{opcode}={cost}"))
            .collect();
        write!(f, "[{}]", entries.join(" "))
    }
}

/// Log and build the error for an instruction a unit does not support.
#[must_use]
pub fn cannot_execute(entity: &Entity, component: &str, instr: &MicroInstruction) -> SimError {
    error!(entity ; "{component} cannot execute the instruction {instr}");
    SimError(format!("{component} cannot execute the instruction {instr}"))
}

/// One of the fixed set of units owned by a core.
pub enum FunctionalUnit {
    Bus(Bus),
    Cpu(Cpu),
    Accelerator(Accelerator),
    Buffer(Buffer),
    Network(NetworkInterface),
}

impl FunctionalUnit {
    /// The unit name that instructions use to address this unit.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            FunctionalUnit::Bus(_) => BUS,
            FunctionalUnit::Cpu(_) => CPU,
            FunctionalUnit::Accelerator(_) => ACC,
            FunctionalUnit::Buffer(_) => BUFFER,
            FunctionalUnit::Network(_) => NI,
        }
    }

    /// Build the standard set of units of a core around its network
    /// interface.
    #[must_use]
    pub fn standard_set(
        parent: &Rc<Entity>,
        latency: &Rc<LatencyTable>,
        ni: NetworkInterface,
    ) -> Vec<FunctionalUnit> {
        vec![
            FunctionalUnit::Bus(Bus::new(parent, latency)),
            FunctionalUnit::Cpu(Cpu::new(parent, latency)),
            FunctionalUnit::Accelerator(Accelerator::new(parent, latency)),
            FunctionalUnit::Buffer(Buffer::new(parent, latency)),
            FunctionalUnit::Network(ni),
        ]
    }

    #[must_use]
    pub fn as_network(&self) -> Option<&NetworkInterface> {
        match self {
            FunctionalUnit::Network(ni) => Some(ni),
            _ => None,
        }
    }
}

impl Simulate for FunctionalUnit {
    fn simulate(
        &mut self,
        instr: &MicroInstruction,
        tensors: &mut TensorTable,
        cycle: Cycle,
    ) -> Result<Outcome, SimError> {
        match self {
            FunctionalUnit::Bus(unit) => unit.simulate(instr, tensors, cycle),
            FunctionalUnit::Cpu(unit) => unit.simulate(instr, tensors, cycle),
            FunctionalUnit::Accelerator(unit) => unit.simulate(instr, tensors, cycle),
            FunctionalUnit::Buffer(unit) => unit.simulate(instr, tensors, cycle),
            FunctionalUnit::Network(unit) => unit.simulate(instr, tensors, cycle),
        }
    }
}

impl fmt::Display for FunctionalUnit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FunctionalUnit::Bus(unit) => write!(f, "{unit}"),
            FunctionalUnit::Cpu(unit) => write!(f, "{unit}"),
            FunctionalUnit::Accelerator(unit) => write!(f, "{unit}"),
            FunctionalUnit::Buffer(unit) => write!(f, "{unit}"),
            FunctionalUnit::Network(unit) => write!(f, "{unit}"),
        }
    }
}
