// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Operators of a task file and their lowering to micro-instructions.
//!
//! Each operator line starts with a type discriminator followed by `#`:
//!
//! ```text
//! compute    # <config> # <outputs> # <inputs>
//! manipulate # <interval> # <count> # <outputs>
//! assemble   # <UNIT.opcode operand...>
//! ```
//!
//! Tensor lists are comma separated. An empty compute config lowers to a
//! fixed-cost CPU instruction instead of an accelerator instruction.

use std::collections::{BTreeMap, VecDeque};

use spatial_engine::instruction::MicroInstruction;
use spatial_engine::sim_error;
use spatial_engine::types::{NodeId, SimError, SimResult, TensorId};
use spatial_engine::units::{ACC, BUFFER, BUS, CPU, NI};

pub const COMPUTE: &str = "compute";
pub const MANIPULATE: &str = "manipulate";
pub const ASSEMBLE: &str = "assemble";

/// Destination nodes of each tensor, taken from the data section.
pub type Destinations = BTreeMap<TensorId, Vec<NodeId>>;

/// Tensors read and written by an operator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperatorIo {
    pub inputs: Vec<TensorId>,
    pub outputs: Vec<TensorId>,
    pub dest_nodes: Destinations,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputeOp {
    pub io: OperatorIo,

    /// Index-contraction config passed to the accelerator. `None` models the
    /// computation on the CPU.
    pub config: Option<String>,

    /// Whether each input is already resident on this core.
    pub input_stationary: Vec<bool>,
}

/// Periodic traffic: send every output `iter_count` times, `interval` cycles
/// apart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManipulateOp {
    pub io: OperatorIo,
    pub interval: i64,
    pub iter_count: u64,
}

/// A hand-written micro-instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssembleOp {
    pub io: OperatorIo,
    pub instr: MicroInstruction,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operator {
    Compute(ComputeOp),
    Manipulate(ManipulateOp),
    Assemble(AssembleOp),
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn parse_list<T: std::str::FromStr>(field: &str, line: &str) -> Result<Vec<T>, SimError> {
    field
        .split(',')
        .filter(|f| !f.is_empty())
        .map(|f| {
            f.parse::<T>()
                .map_err(|_| SimError(format!("invalid value `{f}` in operator `{line}`")))
        })
        .collect()
}

fn parse_count(field: &str, line: &str) -> Result<u64, SimError> {
    field
        .parse()
        .map_err(|_| SimError(format!("invalid count `{field}` in operator `{line}`")))
}

/// A sleep length that fits a micro-instruction operand.
fn parse_interval(field: &str, line: &str) -> Result<i64, SimError> {
    match field.parse::<i64>() {
        Ok(interval) if interval >= 0 => Ok(interval),
        _ => sim_error!("invalid interval `{field}` in operator `{line}`"),
    }
}

impl Operator {
    /// Parse one operator line.
    pub fn parse(line: &str) -> Result<Self, SimError> {
        let Some((kind, body)) = line.split_once('#') else {
            return sim_error!("operator type unspecified in `{line}`");
        };

        if kind.contains(COMPUTE) {
            let body = strip_whitespace(body);
            let [config, outputs, inputs] = body.split('#').collect::<Vec<_>>()[..] else {
                return sim_error!("compute operator `{line}` needs config#outputs#inputs");
            };
            let io = OperatorIo {
                inputs: parse_list(inputs, line)?,
                outputs: parse_list(outputs, line)?,
                dest_nodes: Destinations::new(),
            };
            let input_stationary = vec![false; io.inputs.len()];
            Ok(Operator::Compute(ComputeOp {
                io,
                config: (!config.is_empty()).then(|| config.to_string()),
                input_stationary,
            }))
        } else if kind.contains(MANIPULATE) {
            let body = strip_whitespace(body);
            let [interval, count, outputs] = body.split('#').collect::<Vec<_>>()[..] else {
                return sim_error!("manipulate operator `{line}` needs interval#count#outputs");
            };
            Ok(Operator::Manipulate(ManipulateOp {
                io: OperatorIo {
                    inputs: Vec::new(),
                    outputs: parse_list(outputs, line)?,
                    dest_nodes: Destinations::new(),
                },
                interval: parse_interval(interval, line)?,
                iter_count: parse_count(count, line)?,
            }))
        } else if kind.contains(ASSEMBLE) {
            Ok(Operator::Assemble(AssembleOp {
                io: OperatorIo::default(),
                instr: body.trim().parse()?,
            }))
        } else {
            sim_error!("operator type unspecified in `{line}`")
        }
    }

    #[must_use]
    pub fn io(&self) -> &OperatorIo {
        match self {
            Operator::Compute(op) => &op.io,
            Operator::Manipulate(op) => &op.io,
            Operator::Assemble(op) => &op.io,
        }
    }

    fn io_mut(&mut self) -> &mut OperatorIo {
        match self {
            Operator::Compute(op) => &mut op.io,
            Operator::Manipulate(op) => &mut op.io,
            Operator::Assemble(op) => &mut op.io,
        }
    }

    /// Copy the destination list of every output from the data section.
    pub fn bind_destinations(&mut self, destinations: &Destinations) -> SimResult {
        let io = self.io_mut();
        for output in io.outputs.clone() {
            match destinations.get(&output) {
                Some(dests) if !dests.is_empty() => {
                    io.dest_nodes.insert(output, dests.clone());
                }
                _ => return sim_error!("operator/data mismatch at tensor {output}"),
            }
        }
        Ok(())
    }

    /// Append the micro-instructions of this operator to a track.
    pub fn lower(&self, track: &mut VecDeque<MicroInstruction>) {
        match self {
            Operator::Compute(op) => op.lower(track),
            Operator::Manipulate(op) => op.lower(track),
            Operator::Assemble(op) => track.push_back(op.instr.clone()),
        }
    }
}

fn send(tid: TensorId, dests: &[NodeId]) -> MicroInstruction {
    let mut operands = vec![tid];
    operands.extend(dests.iter().map(|d| *d as i64));
    MicroInstruction::new(NI, "send", operands)
}

impl ComputeOp {
    /// Mark which inputs need fetching over the network.
    ///
    /// Every input is currently fetched, so all are marked non-stationary.
    pub fn discover_stationary(&mut self) {
        self.input_stationary = vec![false; self.io.inputs.len()];
    }

    fn lower(&self, track: &mut VecDeque<MicroInstruction>) {
        let inputs = &self.io.inputs;

        let mut fetched = Vec::new();
        for (tid, stationary) in inputs.iter().zip(&self.input_stationary) {
            if *stationary || fetched.contains(tid) {
                continue;
            }
            fetched.push(*tid);
            track.push_back(MicroInstruction::new(NI, "recv", vec![*tid]));
            track.push_back(MicroInstruction::new(BUS, "trans", vec![*tid]));
            track.push_back(MicroInstruction::new(BUFFER, "write", vec![*tid]));
        }

        for output in &self.io.outputs {
            for tid in inputs {
                track.push_back(MicroInstruction::new(BUFFER, "read", vec![*tid]));
                track.push_back(MicroInstruction::new(BUS, "trans", vec![*tid]));
            }

            match &self.config {
                None => track.push_back(MicroInstruction::new(CPU, "sleep", vec![1])),
                Some(config) => {
                    let mut operands = vec![*output];
                    operands.extend(inputs);
                    track.push_back(MicroInstruction::with_config(ACC, "cal", config, operands));
                }
            }

            track.push_back(MicroInstruction::new(BUS, "trans", vec![*output]));
            track.push_back(MicroInstruction::new(BUFFER, "write", vec![*output]));
            track.push_back(MicroInstruction::new(BUFFER, "read", vec![*output]));
            track.push_back(MicroInstruction::new(BUS, "trans", vec![*output]));
            let dests = self.io.dest_nodes.get(output).map_or(&[][..], Vec::as_slice);
            track.push_back(send(*output, dests));
        }
    }
}

impl ManipulateOp {
    fn lower(&self, track: &mut VecDeque<MicroInstruction>) {
        for _ in 0..self.iter_count {
            for output in &self.io.outputs {
                let dests = self.io.dest_nodes.get(output).map_or(&[][..], Vec::as_slice);
                track.push_back(send(*output, dests));
            }
            track.push_back(MicroInstruction::new(CPU, "sleep", vec![self.interval]));
        }
    }
}
