// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The on-core bus: every transfer has a fixed cost.

use std::fmt;
use std::rc::Rc;

use spatial_track::entity::Entity;

use crate::instruction::MicroInstruction;
use crate::latency::LatencyTable;
use crate::tensor::TensorTable;
use crate::types::{Cycle, SimError};
use crate::units::{BUS, Outcome, Simulate, UnitCosts, complete_after};

pub struct Bus {
    entity: Rc<Entity>,
    costs: UnitCosts,
    num_issued: u64,
}

impl Bus {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, latency: &Rc<LatencyTable>) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "bus")),
            costs: UnitCosts::new(BUS, latency),
            num_issued: 0,
        }
    }
}

impl Simulate for Bus {
    fn simulate(
        &mut self,
        instr: &MicroInstruction,
        _tensors: &mut TensorTable,
        cycle: Cycle,
    ) -> Result<Outcome, SimError> {
        let cost = self.costs.cost(&self.entity, instr)?;
        self.num_issued += 1;
        Ok(complete_after(cycle, cost))
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{BUS}: {} issued {}", self.num_issued, self.costs)
    }
}
