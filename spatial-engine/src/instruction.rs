// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Micro-instructions executed by the functional units of a core.
//!
//! The textual form `UNIT.opcode [config] operand...` is only used at the
//! file boundary (`assemble` operators, logs and stats). Everything else
//! works on the structured [`MicroInstruction`].

use std::fmt;
use std::str::FromStr;

use crate::sim_error;
use crate::types::{SimError, TensorId};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MicroInstruction {
    /// Name of the functional unit that executes this instruction.
    pub unit: String,

    pub opcode: String,

    /// Optional non-numeric configuration (e.g. an index string for the
    /// accelerator).
    pub config: Option<String>,

    /// Tensor ids, node ids or cycle counts depending on the opcode.
    pub operands: Vec<i64>,
}

impl MicroInstruction {
    #[must_use]
    pub fn new(unit: &str, opcode: &str, operands: Vec<i64>) -> Self {
        Self {
            unit: unit.to_string(),
            opcode: opcode.to_string(),
            config: None,
            operands,
        }
    }

    #[must_use]
    pub fn with_config(unit: &str, opcode: &str, config: &str, operands: Vec<i64>) -> Self {
        Self {
            unit: unit.to_string(),
            opcode: opcode.to_string(),
            config: Some(config.to_string()),
            operands,
        }
    }

    /// The `index`th operand or an error naming this instruction.
    pub fn operand(&self, index: usize) -> Result<i64, SimError> {
        match self.operands.get(index) {
            Some(v) => Ok(*v),
            None => sim_error!("{self}: missing operand {index}"),
        }
    }

    /// The `index`th operand interpreted as a tensor id.
    pub fn tensor_operand(&self, index: usize) -> Result<TensorId, SimError> {
        self.operand(index)
    }
}

impl fmt::Display for MicroInstruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.unit, self.opcode)?;
        if let Some(config) = &self.config {
            write!(f, " {config}")?;
        }
        for operand in &self.operands {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

impl FromStr for MicroInstruction {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split_whitespace();
        let Some(head) = tokens.next() else {
            return sim_error!("empty micro-instruction");
        };

        let Some((unit, opcode)) = head.split_once('.') else {
            return sim_error!("micro-instruction `{s}` must start with UNIT.opcode");
        };
        if unit.is_empty() || opcode.is_empty() {
            return sim_error!("micro-instruction `{s}` must start with UNIT.opcode");
        }

        let mut config = None;
        let mut operands = Vec::new();
        for (i, token) in tokens.enumerate() {
            match token.parse::<i64>() {
                Ok(v) => operands.push(v),
                Err(_) if i == 0 => config = Some(token.to_string()),
                Err(_) => {
                    return sim_error!("micro-instruction `{s}`: invalid operand `{token}`");
                }
            }
        }

        Ok(Self {
            unit: unit.to_string(),
            opcode: opcode.to_string(),
            config,
            operands,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_config() {
        let instr: MicroInstruction = "ACC.cal ij,jk->ik 7 1 2".parse().unwrap();
        assert_eq!(instr.unit, "ACC");
        assert_eq!(instr.opcode, "cal");
        assert_eq!(instr.config.as_deref(), Some("ij,jk->ik"));
        assert_eq!(instr.operands, vec![7, 1, 2]);
        assert_eq!(instr.to_string(), "ACC.cal ij,jk->ik 7 1 2");
    }

    #[test]
    fn parse_plain() {
        let instr: MicroInstruction = "  NI.send 3  1 4 ".parse().unwrap();
        assert_eq!(instr, MicroInstruction::new("NI", "send", vec![3, 1, 4]));
    }

    #[test]
    fn parse_errors() {
        assert!("".parse::<MicroInstruction>().is_err());
        assert!("BUS 3".parse::<MicroInstruction>().is_err());
        assert!(".trans 3".parse::<MicroInstruction>().is_err());
        assert!("BUS.trans 3 x".parse::<MicroInstruction>().is_err());
    }

    #[test]
    fn missing_operand() {
        let instr = MicroInstruction::new("CPU", "sleep", vec![]);
        let err = instr.operand(0).unwrap_err();
        assert!(err.0.contains("CPU.sleep: missing operand 0"));
    }
}
