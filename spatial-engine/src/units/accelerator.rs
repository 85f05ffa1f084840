// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The tensor accelerator.
//!
//! `ACC.cal <config> <output> <input>...` performs a contraction described
//! by an einsum-style index string such as `ij,jk->ik`. The number of
//! multiply-accumulates (MACs) is derived from the input shapes and the time
//! taken is the MAC count divided by the `ACC.cal` throughput.
//!
//! The literal config `conv` instead models a convolution with operands
//! `<output> <weight> <input>`, where the weight has rank 4 and the input has
//! rank 3.

use std::fmt;
use std::rc::Rc;

use spatial_track::entity::Entity;
use spatial_track::{debug, error};

use crate::instruction::MicroInstruction;
use crate::latency::LatencyTable;
use crate::sim_error;
use crate::tensor::{Tensor, TensorTable};
use crate::types::{Cycle, SimError, TensorId};
use crate::units::{ACC, Outcome, Simulate, UnitCosts, complete_after};

const CONV: &str = "conv";

pub struct Accelerator {
    entity: Rc<Entity>,
    costs: UnitCosts,
    num_issued: u64,
    total_macs: u64,
}

impl Accelerator {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, latency: &Rc<LatencyTable>) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "acc")),
            costs: UnitCosts::new(ACC, latency),
            num_issued: 0,
            total_macs: 0,
        }
    }
}

impl Simulate for Accelerator {
    fn simulate(
        &mut self,
        instr: &MicroInstruction,
        tensors: &mut TensorTable,
        cycle: Cycle,
    ) -> Result<Outcome, SimError> {
        let rate = self.costs.rate(&self.entity, instr)?;
        let Some(config) = &instr.config else {
            error!(self.entity ; "{instr} has no index config");
            return sim_error!("{ACC} cannot execute the instruction {instr}: missing config");
        };

        let output = instr.tensor_operand(0)?;
        let inputs = &instr.operands[1..];
        let macs = if config == CONV {
            conv_macs(tensors, output, inputs)
        } else {
            einsum_macs(tensors, config, output, inputs)
        }
        .inspect_err(|e| {
            error!(self.entity ; "{instr}: {}", e.0);
        })?;

        debug!(self.entity ; "{instr}: {macs} MACs");
        self.num_issued += 1;
        self.total_macs += macs;
        Ok(complete_after(cycle, macs as f64 / rate))
    }
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{ACC}: {} issued, {} MACs {}",
            self.num_issued, self.total_macs, self.costs
        )
    }
}

fn dims_of(tensors: &TensorTable, tid: TensorId) -> Vec<usize> {
    tensors.get(tid).map(|t| t.dims.clone()).unwrap_or_default()
}

fn dim_at(dims: &[usize], pos: usize, index: char, tid: TensorId) -> Result<usize, SimError> {
    match dims.get(pos) {
        Some(d) => Ok(*d),
        None => sim_error!(
            "tensor size mismatch: index `{index}` has no dimension in tensor {tid} {dims:?}"
        ),
    }
}

/// Set the shape of the output the first time it is produced.
fn allocate_output(tensors: &mut TensorTable, output: TensorId, dims: Vec<usize>) {
    let tensor = tensors.ensure(output);
    if tensor.dims.is_empty() {
        tensor.dims = dims;
    }
}

/// MAC count of an index contraction, allocating the output shape.
pub fn einsum_macs(
    tensors: &mut TensorTable,
    config: &str,
    output: TensorId,
    inputs: &[TensorId],
) -> Result<u64, SimError> {
    let Some((lhs, out_spec)) = config.split_once("->") else {
        return sim_error!("index config `{config}` has no `->`");
    };
    let in_specs: Vec<Vec<char>> = lhs.split(',').map(|s| s.chars().collect()).collect();
    if in_specs.len() != inputs.len() {
        return sim_error!(
            "index config `{config}` names {} inputs but {} are given",
            in_specs.len(),
            inputs.len()
        );
    }
    let in_dims: Vec<Vec<usize>> = inputs.iter().map(|t| dims_of(tensors, *t)).collect();

    let mut macs: u64 = 1;
    if inputs.len() == 1 {
        // Indices missing from the output are reduced
        for (pos, index) in in_specs[0].iter().enumerate() {
            if !out_spec.contains(*index) {
                macs *= dim_at(&in_dims[0], pos, *index, inputs[0])? as u64;
            }
        }
    } else {
        // Indices shared by consecutive inputs and missing from the output
        // are contracted
        for i in 0..inputs.len() - 1 {
            let (t1, t2) = (&in_specs[i], &in_specs[i + 1]);
            for (j, index) in t2.iter().enumerate() {
                let Some(pos) = t1.iter().position(|c| c == index) else {
                    continue;
                };
                if out_spec.contains(*index) {
                    continue;
                }
                let d1 = dim_at(&in_dims[i], pos, *index, inputs[i])?;
                let d2 = dim_at(&in_dims[i + 1], j, *index, inputs[i + 1])?;
                if d1 != d2 {
                    return sim_error!(
                        "tensor size mismatch between tensor {} and tensor {} at index `{index}` ({d1} != {d2})",
                        inputs[i],
                        inputs[i + 1]
                    );
                }
                macs *= d1 as u64;
            }
        }
    }

    let mut out_dims = Vec::with_capacity(out_spec.len());
    for index in out_spec.chars() {
        let found = in_specs
            .iter()
            .enumerate()
            .find_map(|(j, spec)| spec.iter().position(|c| *c == index).map(|pos| (j, pos)));
        let Some((j, pos)) = found else {
            return sim_error!("output index `{index}` of `{config}` appears in no input");
        };
        let d = dim_at(&in_dims[j], pos, index, inputs[j])?;
        macs *= d as u64;
        out_dims.push(d);
    }
    if out_dims.is_empty() {
        out_dims.push(1);
    }

    allocate_output(tensors, output, out_dims);
    Ok(macs)
}

/// MAC count of a convolution, allocating the output shape.
pub fn conv_macs(
    tensors: &mut TensorTable,
    output: TensorId,
    inputs: &[TensorId],
) -> Result<u64, SimError> {
    let [weight, input] = inputs else {
        return sim_error!("conv expects a weight and an input, {} operands given", inputs.len());
    };
    let w_dims = dims_of(tensors, *weight);
    let in_dims = dims_of(tensors, *input);
    if w_dims.len() != 4 || in_dims.len() != 3 {
        return sim_error!(
            "tensor size mismatch: conv expects a rank 4 weight and rank 3 input, got {w_dims:?} and {in_dims:?}"
        );
    }

    allocate_output(tensors, output, vec![w_dims[0], in_dims[1], in_dims[2]]);
    let out_size = tensors.get(output).map_or(0, Tensor::size) as u64;
    if w_dims[0] == 0 {
        return Ok(0);
    }
    let w_size: u64 = w_dims.iter().map(|d| *d as u64).product();
    Ok(out_size * w_size / w_dims[0] as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{latency_table, start_test};

    #[test]
    fn matrix_vector() {
        let mut tensors = TensorTable::new();
        tensors.insert(Tensor::new(1, vec![3, 4]));
        tensors.insert(Tensor::new(2, vec![4]));
        let macs = einsum_macs(&mut tensors, "ik,k->i", 9, &[1, 2]).unwrap();
        assert_eq!(macs, 12);
        assert_eq!(tensors.get(9).unwrap().dims, vec![3]);
    }

    #[test]
    fn matrix_multiply() {
        let mut tensors = TensorTable::new();
        tensors.insert(Tensor::new(1, vec![2, 3]));
        tensors.insert(Tensor::new(2, vec![3, 5]));
        let macs = einsum_macs(&mut tensors, "ij,jk->ik", 3, &[1, 2]).unwrap();
        assert_eq!(macs, 30);
        assert_eq!(tensors.get(3).unwrap().dims, vec![2, 5]);
    }

    #[test]
    fn single_input_reduction() {
        let mut tensors = TensorTable::new();
        tensors.insert(Tensor::new(1, vec![6, 7]));
        let macs = einsum_macs(&mut tensors, "ij->", 2, &[1]).unwrap();
        assert_eq!(macs, 42);
        assert_eq!(tensors.get(2).unwrap().dims, vec![1]);
    }

    #[test]
    fn contracted_size_mismatch() {
        let mut tensors = TensorTable::new();
        tensors.insert(Tensor::new(1, vec![3, 4]));
        tensors.insert(Tensor::new(2, vec![5]));
        let err = einsum_macs(&mut tensors, "ik,k->i", 9, &[1, 2]).unwrap_err();
        assert!(err.0.contains("tensor size mismatch between tensor 1 and tensor 2"));
    }

    #[test]
    fn existing_output_shape_kept() {
        let mut tensors = TensorTable::new();
        tensors.insert(Tensor::new(1, vec![3, 4]));
        tensors.insert(Tensor::new(2, vec![4]));
        tensors.insert(Tensor::new(9, vec![1, 3]));
        einsum_macs(&mut tensors, "ik,k->i", 9, &[1, 2]).unwrap();
        assert_eq!(tensors.get(9).unwrap().dims, vec![1, 3]);
    }

    #[test]
    fn conv() {
        let mut tensors = TensorTable::new();
        tensors.insert(Tensor::new(1, vec![8, 3, 3, 3]));
        tensors.insert(Tensor::new(2, vec![3, 10, 10]));
        let macs = conv_macs(&mut tensors, 5, &[1, 2]).unwrap();
        assert_eq!(tensors.get(5).unwrap().dims, vec![8, 10, 10]);
        assert_eq!(macs, 800 * 27);
    }

    #[test]
    fn conv_rank_mismatch() {
        let mut tensors = TensorTable::new();
        tensors.insert(Tensor::new(1, vec![8, 3, 3]));
        tensors.insert(Tensor::new(2, vec![3, 10, 10]));
        let err = conv_macs(&mut tensors, 5, &[1, 2]).unwrap_err();
        assert!(err.0.contains("tensor size mismatch"));
    }

    #[test]
    fn simulate_uses_throughput() {
        let top = start_test(file!());
        let mut acc = Accelerator::new(&top, &latency_table());
        let mut tensors = TensorTable::new();
        tensors.insert(Tensor::new(1, vec![3, 4]));
        tensors.insert(Tensor::new(2, vec![4]));

        let instr: MicroInstruction = "ACC.cal ik,k->i 9 1 2".parse().unwrap();
        let outcome = acc.simulate(&instr, &mut tensors, 100).unwrap();
        // ACC.cal runs 4 MACs per cycle in the test latency table
        assert_eq!(outcome, Outcome::Complete(103));
    }

    #[test]
    fn missing_config() {
        let top = start_test(file!());
        let mut acc = Accelerator::new(&top, &latency_table());
        let mut tensors = TensorTable::new();
        let instr = MicroInstruction::new(ACC, "cal", vec![9, 1]);
        assert!(acc.simulate(&instr, &mut tensors, 0).is_err());
    }
}
