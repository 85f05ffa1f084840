// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The scratch buffer: reads and writes stream a whole tensor at the
//! throughput given in the latency table.

use std::fmt;
use std::rc::Rc;

use spatial_track::entity::Entity;

use crate::instruction::MicroInstruction;
use crate::latency::LatencyTable;
use crate::tensor::{Tensor, TensorTable};
use crate::types::{Cycle, SimError};
use crate::units::{BUFFER, Outcome, Simulate, UnitCosts, complete_after};

pub struct Buffer {
    entity: Rc<Entity>,
    costs: UnitCosts,
    num_issued: u64,
    elements_moved: u64,
}

impl Buffer {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, latency: &Rc<LatencyTable>) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "buffer")),
            costs: UnitCosts::new(BUFFER, latency),
            num_issued: 0,
            elements_moved: 0,
        }
    }
}

impl Simulate for Buffer {
    fn simulate(
        &mut self,
        instr: &MicroInstruction,
        tensors: &mut TensorTable,
        cycle: Cycle,
    ) -> Result<Outcome, SimError> {
        let rate = self.costs.rate(&self.entity, instr)?;
        let tid = instr.tensor_operand(0)?;
        let size = tensors.get(tid).map_or(0, Tensor::size);
        self.num_issued += 1;
        self.elements_moved += size as u64;
        Ok(complete_after(cycle, size as f64 / rate))
    }
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{BUFFER}: {} issued, {} elements {}",
            self.num_issued, self.elements_moved, self.costs
        )
    }
}
