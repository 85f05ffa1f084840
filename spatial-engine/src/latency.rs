// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Per-component micro-instruction costs.
//!
//! The latency file contains one `COMPONENT.opcode cost` entry per line. The
//! meaning of the cost depends on the unit: a fixed number of cycles for the
//! bus, CPU and network interface, or a throughput (elements or MACs per
//! cycle) for the buffer and accelerator.

use std::collections::BTreeMap;
use std::path::Path;

use crate::sim_error;
use crate::types::{SimError, SimResult};
use crate::units::COMPONENTS;

#[derive(Clone, Debug, PartialEq)]
pub struct LatencyTable {
    costs: BTreeMap<String, BTreeMap<String, f64>>,
}

impl Default for LatencyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyTable {
    /// Create an empty table with every component registered.
    #[must_use]
    pub fn new() -> Self {
        let costs = COMPONENTS
            .iter()
            .map(|c| (c.to_string(), BTreeMap::new()))
            .collect();
        Self { costs }
    }

    pub fn from_file(path: &Path) -> Result<Self, SimError> {
        let s = std::fs::read_to_string(path).map_err(|e| {
            SimError(format!(
                "Unable to read latency file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_string(&s)
    }

    pub fn from_string(latency_str: &str) -> Result<Self, SimError> {
        let mut table = Self::new();
        for (i, line) in latency_str.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (Some(key), Some(cost), None) = (fields.next(), fields.next(), fields.next())
            else {
                return sim_error!("latency line {}: expected `COMPONENT.opcode cost`", i + 1);
            };
            let Some((component, opcode)) = key.split_once('.') else {
                return sim_error!("latency line {}: `{key}` is not COMPONENT.opcode", i + 1);
            };
            let cost: f64 = match cost.parse() {
                Ok(v) if v >= 0.0 && f64::is_finite(v) => v,
                _ => return sim_error!("latency line {}: invalid cost `{cost}`", i + 1),
            };
            table.insert(component, opcode, cost)?;
        }
        Ok(table)
    }

    /// Set the cost of `component.opcode`.
    ///
    /// The component must be one of the units of a core.
    pub fn insert(&mut self, component: &str, opcode: &str, cost: f64) -> SimResult {
        match self.costs.get_mut(component) {
            Some(opcodes) => {
                opcodes.insert(opcode.to_string(), cost);
                Ok(())
            }
            None => sim_error!("unknown component {component} in latency table"),
        }
    }

    #[must_use]
    pub fn cost(&self, component: &str, opcode: &str) -> Option<f64> {
        self.costs
            .get(component)
            .and_then(|opcodes| opcodes.get(opcode))
            .copied()
    }

    /// All `(opcode, cost)` entries of a component in opcode order.
    pub fn entries<'a>(&'a self, component: &str) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        self.costs
            .get(component)
            .into_iter()
            .flat_map(|opcodes| opcodes.iter().map(|(op, cost)| (op.as_str(), *cost)))
    }
}
