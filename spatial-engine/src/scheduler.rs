// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The per-core scheduler.
//!
//! A core holds several parallel tracks of micro-instructions. On each tick
//! the scheduler:
//!  - stalls the whole core while any track is still executing,
//!  - otherwise picks one ready track at random, preferring a track whose
//!    previous instruction has just completed over one that has to retry,
//!  - retires the completed head of that track and issues the next
//!    instruction to the unit named by the instruction.
//!
//! At most one instruction is issued per core per tick.

use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use spatial_track::entity::Entity;
use spatial_track::{error, info, issue, retire, set_cycle, stall, trace};

use crate::instruction::MicroInstruction;
use crate::sim_error;
use crate::tensor::TensorTable;
use crate::types::{Cycle, NodeId, ReadyMarker, SimResult};
use crate::units::{FunctionalUnit, Outcome, Simulate};

/// One independently schedulable queue of micro-instructions.
#[derive(Clone, Debug, Default)]
pub struct InstructionTrack {
    instructions: VecDeque<MicroInstruction>,
    marker: ReadyMarker,
}

impl InstructionTrack {
    #[must_use]
    pub fn new(instructions: VecDeque<MicroInstruction>) -> Self {
        Self {
            instructions,
            marker: ReadyMarker::Unset,
        }
    }

    #[must_use]
    pub fn head(&self) -> Option<&MicroInstruction> {
        self.instructions.front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    #[must_use]
    pub fn marker(&self) -> ReadyMarker {
        self.marker
    }

    fn is_ready(&self, cycle: Cycle) -> bool {
        !self.instructions.is_empty() && !self.marker.is_after(cycle)
    }
}

/// Comparable state of a core used to detect deadlock.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CoreSnapshot {
    tracks: Vec<(ReadyMarker, usize)>,
}

pub struct CoreScheduler {
    entity: Rc<Entity>,
    node: NodeId,
    units: Vec<FunctionalUnit>,
    tracks: Vec<InstructionTrack>,
    tensors: TensorTable,
    rng: StdRng,
    busy_cycles: u64,
    idle_cycles: u64,
    last_cycle: Option<Cycle>,
}

impl CoreScheduler {
    /// Create the scheduler of core `node`.
    ///
    /// `seed` seeds the arbitration between ready tracks.
    #[must_use]
    pub fn new(
        entity: &Rc<Entity>,
        node: NodeId,
        units: Vec<FunctionalUnit>,
        tracks: Vec<VecDeque<MicroInstruction>>,
        tensors: TensorTable,
        seed: u64,
    ) -> Self {
        let tracks: Vec<InstructionTrack> = tracks.into_iter().map(InstructionTrack::new).collect();
        let lengths: Vec<String> = tracks.iter().map(|t| t.len().to_string()).collect();
        info!(entity ;
            "core {node} has {} parallel tracks of {} instructions",
            tracks.len(),
            lengths.join("-")
        );
        Self {
            entity: entity.clone(),
            node,
            units,
            tracks,
            tensors,
            rng: StdRng::seed_from_u64(seed),
            busy_cycles: 0,
            idle_cycles: 0,
            last_cycle: None,
        }
    }

    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    #[must_use]
    pub fn tracks(&self) -> &[InstructionTrack] {
        &self.tracks
    }

    #[must_use]
    pub fn tensors(&self) -> &TensorTable {
        &self.tensors
    }

    #[must_use]
    pub fn units(&self) -> &[FunctionalUnit] {
        &self.units
    }

    #[must_use]
    pub fn busy_cycles(&self) -> u64 {
        self.busy_cycles
    }

    #[must_use]
    pub fn idle_cycles(&self) -> u64 {
        self.idle_cycles
    }

    /// Any track still executing an instruction at `cycle`.
    #[must_use]
    pub fn is_busy(&self, cycle: Cycle) -> bool {
        self.tracks.iter().any(|t| t.marker.is_after(cycle))
    }

    /// Every track is empty and nothing is executing at `cycle`.
    #[must_use]
    pub fn is_finished(&self, cycle: Cycle) -> bool {
        self.tracks
            .iter()
            .all(|t| t.is_empty() && !t.marker.is_after(cycle))
    }

    #[must_use]
    pub fn snapshot(&self) -> CoreSnapshot {
        CoreSnapshot {
            tracks: self.tracks.iter().map(|t| (t.marker, t.len())).collect(),
        }
    }

    /// Refresh the credit advertised by this core's network interface.
    pub fn refresh_credit(&self) -> SimResult {
        for unit in &self.units {
            if let Some(ni) = unit.as_network() {
                ni.refresh_credit()?;
            }
        }
        Ok(())
    }

    /// Advance the core by one clock tick.
    pub fn tick(&mut self, cycle: Cycle) -> SimResult {
        set_cycle!(self.entity ; cycle);
        self.update_stats(cycle);

        if self.is_finished(cycle) || self.is_busy(cycle) {
            return Ok(());
        }

        let Some(idx) = self.select_track(cycle) else {
            return Ok(());
        };

        let track = &mut self.tracks[idx];
        if track.marker.is_set()
            && let Some(done) = track.instructions.pop_front()
        {
            retire!(self.entity ; idx, done);
        }

        let Some(instr) = track.instructions.front() else {
            return Ok(());
        };

        let Some(unit) = self.units.iter_mut().find(|u| u.name() == instr.unit) else {
            error!(self.entity ; "no functional unit executes {instr}");
            return sim_error!(
                "no functional unit named {} for {instr} on core {}",
                instr.unit,
                self.node
            );
        };

        let outcome = unit.simulate(instr, &mut self.tensors, cycle)?;
        match outcome {
            Outcome::Complete(done_at) => {
                issue!(self.entity ; idx, instr);
                trace!(self.entity ; "t{idx} busy until {done_at}");
            }
            Outcome::NotYet => stall!(self.entity ; idx, instr),
        }
        track.marker = outcome.into();
        Ok(())
    }

    /// Count the previous tick as busy or idle.
    fn update_stats(&mut self, cycle: Cycle) {
        if let Some(last) = self.last_cycle {
            if cycle <= last {
                return;
            }
            if self.is_busy(last) {
                self.busy_cycles += 1;
            } else {
                self.idle_cycles += 1;
            }
        }
        self.last_cycle = Some(cycle);
    }

    fn select_track(&mut self, cycle: Cycle) -> Option<usize> {
        let mut candidates: Vec<usize> = (0..self.tracks.len())
            .filter(|i| self.tracks[*i].is_ready(cycle))
            .collect();
        candidates.shuffle(&mut self.rng);

        // Tracks whose last instruction completed go before retries
        candidates
            .iter()
            .find(|i| self.tracks[**i].marker.is_set())
            .or_else(|| candidates.first())
            .copied()
    }

    /// Write a textual dump of this core's state.
    pub fn write_stats(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write!(w, "{self}")
    }
}

impl fmt::Display for CoreScheduler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "CORE {} stats:", self.node)?;
        writeln!(
            f,
            "  busy {} cycles, idle {} cycles",
            self.busy_cycles, self.idle_cycles
        )?;
        if self.tracks.iter().all(InstructionTrack::is_empty) {
            writeln!(f, "  all instructions finished")?;
        } else {
            for (i, track) in self.tracks.iter().enumerate() {
                if let Some(head) = track.head() {
                    writeln!(f, "  t{i} ({} left, ready {}): {head}", track.len(), track.marker)?;
                }
            }
        }
        for unit in &self.units {
            writeln!(f, "  {unit}")?;
        }
        Ok(())
    }
}

