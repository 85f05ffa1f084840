// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Models of the network that moves packets between cores.

use std::collections::BTreeMap;
use std::rc::Rc;

use spatial_engine::packet::{Packet, PortQueues};
use spatial_engine::sim_error;
use spatial_engine::types::{Cycle, NodeId, SimResult};
use spatial_track::entity::Entity;
use spatial_track::trace;

/// The network seen by the array: it drains every outbound queue and fills
/// inbound queues.
pub trait Interconnect {
    /// Move packets at the end of `cycle`. `ports` is indexed by node.
    fn step(&mut self, cycle: Cycle, ports: &[PortQueues]) -> SimResult;

    /// Number of packet copies injected but not yet delivered.
    fn in_flight(&self) -> usize;
}

/// A contention-free network.
///
/// A packet reaches each destination `hops * cycles_per_hop + size` cycles
/// after it was injected, where `hops` counts every segment and relay on the
/// way from the root of its routing tree.
pub struct IdealInterconnect {
    entity: Rc<Entity>,
    cycles_per_hop: u64,

    /// Packets ordered by delivery cycle, then by injection order.
    in_flight: BTreeMap<(Cycle, u64), (NodeId, Packet)>,
    next_seq: u64,
}

impl IdealInterconnect {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, cycles_per_hop: u64) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "network")),
            cycles_per_hop,
            in_flight: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn inject(&mut self, cycle: Cycle, packet: &Packet) -> SimResult {
        for dest in packet.destinations() {
            let Some(hops) = packet.path.hops_to(*dest) else {
                return sim_error!("{packet} has no path to node {dest}");
            };
            let due = cycle + hops as u64 * self.cycles_per_hop + packet.size as u64;
            trace!(self.entity ; "{packet} reaches node {dest} at cycle {due}");
            self.in_flight
                .insert((due, self.next_seq), (*dest, packet.clone()));
            self.next_seq += 1;
        }
        Ok(())
    }
}

impl Interconnect for IdealInterconnect {
    fn step(&mut self, cycle: Cycle, ports: &[PortQueues]) -> SimResult {
        while let Some(entry) = self.in_flight.first_entry() {
            if entry.key().0 > cycle {
                break;
            }
            let (dest, packet) = entry.remove();
            let Some(port) = ports.get(dest) else {
                return sim_error!("{packet} addressed to node {dest} outside the array");
            };
            trace!(self.entity ; "deliver {packet} to node {dest}");
            port.inbound.borrow_mut().push_back(packet);
        }

        for port in ports {
            let injected: Vec<Packet> = port.outbound.borrow_mut().drain(..).collect();
            for packet in &injected {
                self.inject(cycle, packet)?;
            }
        }
        Ok(())
    }

    fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
