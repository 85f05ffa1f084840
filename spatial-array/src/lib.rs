// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Drive a whole array of cores.
//!
//! The [`SpatialArray`] owns one [`CoreScheduler`] per node, the packet
//! queues joining every core to the [`Interconnect`] and the credit board
//! shared by all network interfaces. Each call to [`SpatialArray::step`]
//! advances the global clock by one cycle.

use std::io::Write;
use std::rc::Rc;

use spatial_compiler::TaskCompiler;
use spatial_engine::latency::LatencyTable;
use spatial_engine::packet::{CreditBoard, PortQueues};
use spatial_engine::routing::RoutingTable;
use spatial_engine::scheduler::{CoreScheduler, CoreSnapshot};
use spatial_engine::sim_error;
use spatial_engine::types::{Cycle, SimError, SimResult};
use spatial_engine::units::FunctionalUnit;
use spatial_engine::units::network_interface::{NetworkInterface, NetworkInterfaceConfig};
use spatial_track::entity::Entity;
use spatial_track::{error, info, warn};

pub mod config;
pub mod interconnect;

use config::ArrayConfig;
use interconnect::{IdealInterconnect, Interconnect};

/// State compared between deadlock checks.
#[derive(Clone, Debug, PartialEq, Eq)]
struct ArraySnapshot {
    cores: Vec<CoreSnapshot>,
    queues: Vec<(usize, usize)>,
    credits: Vec<bool>,
    in_flight: usize,
}

pub struct SpatialArray {
    entity: Rc<Entity>,
    config: ArrayConfig,
    cores: Vec<CoreScheduler>,
    ports: Vec<PortQueues>,
    credits: CreditBoard,
    interconnect: Box<dyn Interconnect>,
    cycle: Cycle,
    last_snapshot: Option<ArraySnapshot>,
}

impl SpatialArray {
    /// Build an array connected by an [`IdealInterconnect`].
    pub fn new(parent: &Rc<Entity>, config: ArrayConfig) -> Result<Self, SimError> {
        let entity = Rc::new(Entity::new(parent, "array"));
        let interconnect = Box::new(IdealInterconnect::new(&entity, config.cycles_per_hop));
        Self::build(entity, config, interconnect)
    }

    pub fn with_interconnect(
        parent: &Rc<Entity>,
        config: ArrayConfig,
        interconnect: Box<dyn Interconnect>,
    ) -> Result<Self, SimError> {
        let entity = Rc::new(Entity::new(parent, "array"));
        Self::build(entity, config, interconnect)
    }

    fn build(
        entity: Rc<Entity>,
        config: ArrayConfig,
        interconnect: Box<dyn Interconnect>,
    ) -> Result<Self, SimError> {
        if config.array_size == 0 {
            return sim_error!("the array needs at least one core");
        }

        // Tables shared by every core are loaded once, before any core exists
        let latency = Rc::new(LatencyTable::from_file(&config.latency_file)?);
        let routing = RoutingTable::from_file(&entity, &config.routing_file)?;
        routing.check_nodes(config.array_size)?;
        let routing = Rc::new(routing);

        let credits = CreditBoard::new(config.array_size);
        let mut ports = Vec::with_capacity(config.array_size);
        let mut cores = Vec::with_capacity(config.array_size);

        for node in 0..config.array_size {
            let core_entity = Rc::new(Entity::new(&entity, &format!("core{node}")));
            let task = TaskCompiler::new(&core_entity).compile_file(&config.task_path(node)?)?;

            let port = PortQueues::new();
            let ni_config = NetworkInterfaceConfig {
                node,
                threshold: config.threshold,
                channel_width: config.channel_width,
                delivery: config.delivery,
            };
            let ni =
                NetworkInterface::new(&core_entity, &ni_config, port.clone(), &credits, &routing)?;
            let units = FunctionalUnit::standard_set(&core_entity, &latency, ni);

            cores.push(CoreScheduler::new(
                &core_entity,
                node,
                units,
                task.tracks,
                task.tensors,
                config.seed + node as u64,
            ));
            ports.push(port);
        }

        info!(entity ;
            "built an array of {} cores ({} delivery)",
            config.array_size,
            config.delivery
        );
        Ok(Self {
            entity,
            config,
            cores,
            ports,
            credits,
            interconnect,
            cycle: 0,
            last_snapshot: None,
        })
    }

    /// The next cycle to be simulated.
    #[must_use]
    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    #[must_use]
    pub fn cores(&self) -> &[CoreScheduler] {
        &self.cores
    }

    #[must_use]
    pub fn ports(&self) -> &[PortQueues] {
        &self.ports
    }

    #[must_use]
    pub fn config(&self) -> &ArrayConfig {
        &self.config
    }

    /// Instructions not yet retired across all cores.
    #[must_use]
    pub fn pending_instructions(&self) -> usize {
        self.cores
            .iter()
            .flat_map(|core| core.tracks())
            .map(|track| track.len())
            .sum()
    }

    /// Every core has finished and no packet is still travelling.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.cores.iter().all(|core| core.is_finished(self.cycle))
            && self.interconnect.in_flight() == 0
            && self.ports.iter().all(|p| p.outbound.borrow().is_empty())
    }

    /// Simulate one cycle.
    pub fn step(&mut self) -> SimResult {
        // Every flag must be current before any doorbell reads them
        for core in &self.cores {
            core.refresh_credit()?;
        }
        for core in &mut self.cores {
            core.tick(self.cycle)?;
        }
        self.interconnect.step(self.cycle, &self.ports)?;
        self.cycle += 1;
        Ok(())
    }

    /// Run until finished, deadlocked or `max_cycles` is reached.
    pub fn run(&mut self) -> SimResult {
        self.run_with(|_| {})
    }

    /// As [`run`](Self::run), calling `observe` after every cycle.
    pub fn run_with(&mut self, mut observe: impl FnMut(&SpatialArray)) -> SimResult {
        let interval = self.config.deadlock_check_interval;
        while !self.is_finished() {
            if self.config.max_cycles != 0 && self.cycle >= self.config.max_cycles {
                warn!(self.entity ;
                    "stopped at the cycle limit {} before finishing",
                    self.config.max_cycles
                );
                return Ok(());
            }
            self.step()?;
            observe(&*self);
            if interval != 0 && self.cycle % interval == 0 {
                self.check_deadlock()?;
            }
        }
        info!(self.entity ; "all cores finished at cycle {}", self.cycle);
        Ok(())
    }

    fn snapshot(&self) -> ArraySnapshot {
        ArraySnapshot {
            cores: self.cores.iter().map(CoreScheduler::snapshot).collect(),
            queues: self
                .ports
                .iter()
                .map(|p| (p.outbound.borrow().len(), p.inbound.borrow().len()))
                .collect(),
            credits: self.credits.snapshot(),
            in_flight: self.interconnect.in_flight(),
        }
    }

    /// Fail if nothing has changed since the previous check while work
    /// remains and nothing is executing or travelling.
    fn check_deadlock(&mut self) -> SimResult {
        let snapshot = self.snapshot();
        let waiting = !self.is_finished()
            && self.interconnect.in_flight() == 0
            && !self.cores.iter().any(|core| core.is_busy(self.cycle));
        let stuck = waiting && self.last_snapshot.as_ref() == Some(&snapshot);
        self.last_snapshot = Some(snapshot);

        if stuck {
            error!(self.entity ;
                "no progress in the last {} cycles",
                self.config.deadlock_check_interval
            );
            for core in &self.cores {
                error!(self.entity ; "{core}");
            }
            return sim_error!("deadlock detected at cycle {}", self.cycle);
        }
        Ok(())
    }

    /// Write the stats of every core.
    pub fn write_stats(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "cycle {}", self.cycle)?;
        for core in &self.cores {
            core.write_stats(w)?;
        }
        Ok(())
    }
}
