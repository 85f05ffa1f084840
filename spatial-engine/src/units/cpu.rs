// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The scalar CPU of a core.
//!
//! Supports:
//!  - `reshape <tensor> <dim>...`: change the shape of a tensor in place
//!  - `poll`: fixed cost
//!  - `sleep <cycles>`: wait for an explicit number of cycles

use std::fmt;
use std::rc::Rc;

use spatial_track::entity::Entity;
use spatial_track::{debug, error};

use crate::instruction::MicroInstruction;
use crate::latency::LatencyTable;
use crate::sim_error;
use crate::tensor::TensorTable;
use crate::types::{Cycle, SimError, SimResult};
use crate::units::{CPU, Outcome, Simulate, UnitCosts, cannot_execute, complete_after};

pub struct Cpu {
    entity: Rc<Entity>,
    costs: UnitCosts,
    num_issued: u64,
}

impl Cpu {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, latency: &Rc<LatencyTable>) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "cpu")),
            costs: UnitCosts::new(CPU, latency),
            num_issued: 0,
        }
    }

    fn reshape(&self, instr: &MicroInstruction, tensors: &mut TensorTable) -> SimResult {
        let tid = instr.tensor_operand(0)?;
        let mut dims = Vec::with_capacity(instr.operands.len().saturating_sub(1));
        for d in &instr.operands[1..] {
            match usize::try_from(*d) {
                Ok(d) => dims.push(d),
                Err(_) => return sim_error!("cannot reshape tensor {tid}: invalid dimension {d}"),
            }
        }

        let Some(tensor) = tensors.get_mut(tid) else {
            return sim_error!("cannot reshape unknown tensor {tid}");
        };

        let new_size: usize = dims.iter().product();
        if new_size != tensor.size() {
            error!(self.entity ; "size mismatch reshaping {tensor} to {dims:?}");
            return sim_error!(
                "cannot reshape tensor {tid}: size mismatch between {} elements and {dims:?}",
                tensor.size()
            );
        }
        debug!(self.entity ; "reshape {tensor} to {dims:?}");
        tensor.dims = dims;
        Ok(())
    }
}

impl Simulate for Cpu {
    fn simulate(
        &mut self,
        instr: &MicroInstruction,
        tensors: &mut TensorTable,
        cycle: Cycle,
    ) -> Result<Outcome, SimError> {
        let cost = self.costs.cost(&self.entity, instr)?;
        let outcome = match instr.opcode.as_str() {
            "reshape" => {
                self.reshape(instr, tensors)?;
                complete_after(cycle, cost)
            }
            "poll" => complete_after(cycle, cost),
            "sleep" => {
                let Ok(cycles) = Cycle::try_from(instr.operand(0)?) else {
                    return sim_error!("{instr}: cannot sleep for a negative number of cycles");
                };
                let Some(done_at) = cycle.checked_add(cycles) else {
                    return sim_error!("{instr}: sleeping from cycle {cycle} overflows the clock");
                };
                Outcome::Complete(done_at)
            }
            _ => return Err(cannot_execute(&self.entity, CPU, instr)),
        };
        self.num_issued += 1;
        Ok(outcome)
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{CPU}: {} issued {}", self.num_issued, self.costs)
    }
}
