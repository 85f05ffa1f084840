// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Compile a per-core task file into micro-instruction tracks.
//!
//! A task file has an `operators` section and a `data` section, in either
//! order:
//!
//! ```text
//! operators:
//! {
//!   compute # ij,jk->ik # 5 # 1, 2
//! }
//! {
//!   manipulate # 10 # 3 # 6
//! }
//! data:
//! 5 # 2, 3 # 4, 4
//! 6 # 1 #
//! ```
//!
//! Each `{ ... }` block of operators forms one track. Operators outside any
//! block are appended to the most recent track. Data lines have the form
//! `tensor # destinations # dims`. Lines starting with `//` are comments.
//!
//! Compilation runs in two passes. The first parses the sections and checks
//! that every operator output has been declared with at least one
//! destination. The second lowers each operator in track order.

use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use spatial_engine::instruction::MicroInstruction;
use spatial_engine::sim_error;
use spatial_engine::tensor::{Tensor, TensorTable};
use spatial_engine::types::{NodeId, SimError, SimResult, TensorId};
use spatial_track::entity::Entity;
use spatial_track::{debug, info};

pub mod operator;

use operator::{Destinations, Operator};

/// Output of compiling one task file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompiledTask {
    pub tracks: Vec<VecDeque<MicroInstruction>>,
    pub tensors: TensorTable,
}

impl fmt::Display for CompiledTask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, track) in self.tracks.iter().enumerate() {
            writeln!(f, "track {i}:")?;
            for instr in track {
                writeln!(f, "  {instr}")?;
            }
        }
        write!(f, "{}", self.tensors)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Operators,
    Data,
}

/// Result of the first pass over a task file.
#[derive(Default)]
struct ParsedTask {
    tracks: Vec<Vec<Operator>>,
    tensors: TensorTable,
    destinations: Destinations,
}

pub struct TaskCompiler {
    entity: Rc<Entity>,
}

impl TaskCompiler {
    #[must_use]
    pub fn new(parent: &Rc<Entity>) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "compiler")),
        }
    }

    /// Read and compile a task file.
    pub fn compile_file(&self, path: &Path) -> Result<CompiledTask, SimError> {
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return sim_error!("task file {} not found", path.display());
            }
            Err(e) => return sim_error!("unable to read task file {}: {e}", path.display()),
        };
        self.compile_str(&source, &path.display().to_string())
    }

    /// Compile task source text. `name` is only used in messages.
    pub fn compile_str(&self, source: &str, name: &str) -> Result<CompiledTask, SimError> {
        let mut parsed = parse_sections(source, name)?;
        allocate_missing_inputs(&mut parsed);
        bind_destinations(&mut parsed, name)?;
        discover_stationary(&mut parsed);
        let task = lower(parsed);

        info!(self.entity ; "compiled {name}: {} tracks, {} tensors",
            task.tracks.len(), task.tensors.len());
        for (i, track) in task.tracks.iter().enumerate() {
            debug!(self.entity ; "track {i}: {} micro-instructions", track.len());
        }
        Ok(task)
    }
}

fn malformed(name: &str, line_num: usize, reason: &str) -> SimResult {
    sim_error!("malformed section marker in {name} line {line_num}: {reason}")
}

fn parse_sections(source: &str, name: &str) -> Result<ParsedTask, SimError> {
    let mut parsed = ParsedTask::default();
    let mut section = Section::Preamble;
    let mut in_block = false;

    for (i, raw) in source.lines().enumerate() {
        let line_num = i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        if line.contains("operators") || line.contains("data") {
            if in_block {
                malformed(name, line_num, "section starts inside a block")?;
            }
            section = if line.contains("operators") {
                Section::Operators
            } else {
                Section::Data
            };
            if section == Section::Operators && line.contains('{') {
                parsed.tracks.push(Vec::new());
                in_block = true;
            }
            continue;
        }

        match section {
            Section::Preamble => {
                malformed(name, line_num, "line outside an operators or data section")?;
            }
            Section::Operators => {
                if line.contains('{') {
                    if in_block {
                        malformed(name, line_num, "nested block")?;
                    }
                    parsed.tracks.push(Vec::new());
                    in_block = true;
                } else if line.contains('}') {
                    if !in_block {
                        malformed(name, line_num, "unmatched `}`")?;
                    }
                    in_block = false;
                } else {
                    let op = Operator::parse(line)
                        .map_err(|e| SimError(format!("{name} line {line_num}: {}", e.0)))?;
                    match parsed.tracks.last_mut() {
                        Some(track) => track.push(op),
                        None => parsed.tracks.push(vec![op]),
                    }
                }
            }
            Section::Data => parse_data_line(&mut parsed, line, name, line_num)?,
        }
    }

    if in_block {
        malformed(name, source.lines().count(), "unclosed block")?;
    }
    Ok(parsed)
}

fn parse_data_line(parsed: &mut ParsedTask, line: &str, name: &str, line_num: usize) -> SimResult {
    let stripped: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    let fields: Vec<&str> = stripped.split('#').collect();
    if fields.len() < 2 || fields.len() > 3 {
        return sim_error!("{name} line {line_num}: data line `{line}` needs tensor#dests#dims");
    }

    let invalid =
        |field: &str| SimError(format!("{name} line {line_num}: invalid value `{field}`"));
    let tid: TensorId = fields[0].parse().map_err(|_| invalid(fields[0]))?;
    let dests = fields[1]
        .split(',')
        .filter(|f| !f.is_empty())
        .map(|f| f.parse::<NodeId>().map_err(|_| invalid(f)))
        .collect::<Result<Vec<_>, _>>()?;
    let dims = fields
        .get(2)
        .copied()
        .unwrap_or("")
        .split(',')
        .filter(|f| !f.is_empty())
        .map(|f| f.parse::<usize>().map_err(|_| invalid(f)))
        .collect::<Result<Vec<_>, _>>()?;

    if parsed.tensors.contains(tid) {
        return sim_error!("{name} line {line_num}: tensor {tid} declared twice");
    }
    parsed.tensors.insert(Tensor::new(tid, dims));
    parsed.destinations.insert(tid, dests);
    Ok(())
}

/// Inputs with no data line start out as tensors with unknown shape.
fn allocate_missing_inputs(parsed: &mut ParsedTask) {
    for op in parsed.tracks.iter().flatten() {
        for tid in &op.io().inputs {
            parsed.tensors.ensure(*tid);
        }
    }
}

fn bind_destinations(parsed: &mut ParsedTask, name: &str) -> SimResult {
    for op in parsed.tracks.iter_mut().flatten() {
        op.bind_destinations(&parsed.destinations)
            .map_err(|e| SimError(format!("{} in file {name}", e.0)))?;
    }
    Ok(())
}

fn discover_stationary(parsed: &mut ParsedTask) {
    for op in parsed.tracks.iter_mut().flatten() {
        if let Operator::Compute(compute) = op {
            compute.discover_stationary();
        }
    }
}

fn lower(parsed: ParsedTask) -> CompiledTask {
    let tracks = parsed
        .tracks
        .iter()
        .map(|ops| {
            let mut track = VecDeque::new();
            for op in ops {
                op.lower(&mut track);
            }
            track
        })
        .collect();

    CompiledTask {
        tracks,
        tensors: parsed.tensors,
    }
}
