// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The network interface (NI) connecting a core to the network.
//!
//! Supports:
//!  - `send <tensor> <dest>...`: packetize a tensor for every destination
//!  - `recv <tensor>`: wait for a packet carrying a tensor
//!
//! Sends are admitted by a _doorbell_: packets are only enqueued if every
//! destination currently advertises credit on the shared [`CreditBoard`].
//! Each node advertises credit while its inbound queue holds no more than
//! `threshold` packets.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use spatial_track::entity::Entity;
use spatial_track::{debug, error, trace, warn};

use crate::instruction::MicroInstruction;
use crate::packet::{CreditBoard, Packet, PortQueues};
use crate::routing::{RoutingTable, RoutingTree};
use crate::sim_error;
use crate::tensor::{Tensor, TensorTable};
use crate::types::{Cycle, NodeId, SimError, SimResult, TensorId};
use crate::units::{NI, Outcome, Simulate, cannot_execute};

/// How a send to several destinations is turned into packets.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// One packet per destination.
    #[default]
    Unicast,

    /// One packet following the tensor's multicast tree.
    Multicast,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeliveryMode::Unicast => write!(f, "unicast"),
            DeliveryMode::Multicast => write!(f, "multicast"),
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unicast" => Ok(DeliveryMode::Unicast),
            "multicast" => Ok(DeliveryMode::Multicast),
            _ => sim_error!("unknown delivery mode `{s}` (expected unicast or multicast)"),
        }
    }
}

pub struct NetworkInterfaceConfig {
    /// The node this interface belongs to.
    pub node: NodeId,

    /// Credit is advertised while the inbound queue holds at most this many
    /// packets.
    pub threshold: usize,

    /// Number of tensor elements per transfer unit.
    pub channel_width: usize,

    pub delivery: DeliveryMode,
}

pub struct NetworkInterface {
    entity: Rc<Entity>,
    node: NodeId,
    ports: PortQueues,
    credits: CreditBoard,
    routing: Rc<RoutingTable>,
    threshold: usize,
    channel_width: usize,
    delivery: DeliveryMode,
    num_sent: u64,
    num_received: u64,
}

impl NetworkInterface {
    pub fn new(
        parent: &Rc<Entity>,
        config: &NetworkInterfaceConfig,
        ports: PortQueues,
        credits: &CreditBoard,
        routing: &Rc<RoutingTable>,
    ) -> Result<Self, SimError> {
        if config.channel_width == 0 {
            return sim_error!("channel width must be non-zero");
        }
        if config.node >= credits.len() {
            return sim_error!(
                "node {} outside a credit board of {} nodes",
                config.node,
                credits.len()
            );
        }
        Ok(Self {
            entity: Rc::new(Entity::new(parent, "ni")),
            node: config.node,
            ports,
            credits: credits.clone(),
            routing: routing.clone(),
            threshold: config.threshold,
            channel_width: config.channel_width,
            delivery: config.delivery,
            num_sent: 0,
            num_received: 0,
        })
    }

    #[must_use]
    pub fn ports(&self) -> &PortQueues {
        &self.ports
    }

    /// Advertise whether this node can accept more packets.
    pub fn refresh_credit(&self) -> SimResult {
        let open = self.ports.inbound.borrow().len() <= self.threshold;
        self.credits.set(self.node, open)
    }

    fn send(
        &mut self,
        instr: &MicroInstruction,
        tensors: &TensorTable,
        cycle: Cycle,
    ) -> Result<Outcome, SimError> {
        let tid = instr.tensor_operand(0)?;

        let mut dests = Vec::new();
        for d in &instr.operands[1..] {
            let Ok(dest) = NodeId::try_from(*d) else {
                return sim_error!("{instr}: invalid destination {d}");
            };
            if dest == self.node {
                warn!(self.entity ;
                    "node {} sends tensor {tid} to itself, the packet is dropped but this may cause deadlocks",
                    self.node
                );
            } else if !dests.contains(&dest) {
                dests.push(dest);
            }
        }
        if dests.is_empty() {
            return Ok(Outcome::Complete(cycle + 1));
        }

        let Some(tensor) = tensors.get(tid) else {
            return Err(cannot_execute(&self.entity, NI, instr));
        };

        // Packets are only built once every destination has credit
        if !self.credits.all_open(&dests)? {
            trace!(self.entity ; "destinations {dests:?} of tensor {tid} are unavailable");
            return Ok(Outcome::NotYet);
        }
        let packets = self.build_packets(tensor, &dests)?;

        let mut outbound = self.ports.outbound.borrow_mut();
        for packet in packets {
            debug!(self.entity ; "enqueue {packet}");
            outbound.push_back(packet);
            self.num_sent += 1;
        }
        Ok(Outcome::Complete(cycle + 1))
    }

    fn build_packets(&self, tensor: &Tensor, dests: &[NodeId]) -> Result<Vec<Packet>, SimError> {
        let tree = self.routing.get(tensor.id);
        match self.delivery {
            DeliveryMode::Unicast => {
                if let Some(tree) = tree
                    && (dests.len() > 1 || tree.destinations() != &BTreeSet::from([dests[0]]))
                {
                    warn!(self.entity ;
                        "ignoring the multicast tree of tensor {}, only unicast packets are sent",
                        tensor.id
                    );
                }
                let packets = dests
                    .iter()
                    .map(|dest| {
                        let path = match tree {
                            Some(tree) if tree.destinations() == &BTreeSet::from([*dest]) => {
                                tree.clone()
                            }
                            _ => Rc::new(RoutingTree::direct(self.node, *dest)),
                        };
                        self.packet(tensor, path)
                    })
                    .collect();
                Ok(packets)
            }
            DeliveryMode::Multicast => {
                let requested: BTreeSet<NodeId> = dests.iter().copied().collect();
                let path = match tree {
                    Some(tree) => {
                        if tree.destinations() != &requested {
                            error!(self.entity ;
                                "tree of tensor {} does not match {requested:?}",
                                tensor.id
                            );
                            return sim_error!(
                                "routing tree for tensor {} reaches {:?} but the send names {requested:?}",
                                tensor.id,
                                tree.destinations()
                            );
                        }
                        tree.clone()
                    }
                    None if dests.len() == 1 => Rc::new(RoutingTree::direct(self.node, dests[0])),
                    None => {
                        error!(self.entity ; "no multicast tree for tensor {}", tensor.id);
                        return sim_error!(
                            "please specify the multicast tree for tensor {}",
                            tensor.id
                        );
                    }
                };
                Ok(vec![self.packet(tensor, path)])
            }
        }
    }

    fn packet(&self, tensor: &Tensor, path: Rc<RoutingTree>) -> Packet {
        let mut payload = tensor.clone();
        let mut size = payload.size().div_ceil(self.channel_width);
        if size == 0 {
            warn!(self.entity ; "tensor {} is empty, padding it with one flit", tensor.id);
            payload.dims = vec![1];
            size = 1;
        }
        Packet {
            flow_id: tensor.id,
            source: self.node,
            size,
            path,
            payload,
        }
    }

    fn recv(
        &mut self,
        tid: TensorId,
        tensors: &mut TensorTable,
        cycle: Cycle,
    ) -> Result<Outcome, SimError> {
        // Packets for other tensors keep their relative order
        let mut inbound = self.ports.inbound.borrow_mut();
        let Some(pos) = inbound.iter().position(|p| p.flow_id == tid) else {
            trace!(self.entity ; "tensor {tid} has not arrived");
            return Ok(Outcome::NotYet);
        };
        let Some(packet) = inbound.remove(pos) else {
            return Ok(Outcome::NotYet);
        };
        debug!(self.entity ; "received {packet}");
        tensors.insert(Tensor::new(tid, packet.payload.dims));
        self.num_received += 1;
        Ok(Outcome::Complete(cycle + 1))
    }
}

impl Simulate for NetworkInterface {
    fn simulate(
        &mut self,
        instr: &MicroInstruction,
        tensors: &mut TensorTable,
        cycle: Cycle,
    ) -> Result<Outcome, SimError> {
        self.refresh_credit()?;
        match instr.opcode.as_str() {
            "send" => self.send(instr, tensors, cycle),
            "recv" => {
                let tid = instr.tensor_operand(0)?;
                self.recv(tid, tensors, cycle)
            }
            _ => Err(cannot_execute(&self.entity, NI, instr)),
        }
    }
}

impl fmt::Display for NetworkInterface {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let open = self.credits.is_open(self.node).unwrap_or(false);
        write!(
            f,
            "{NI}: outbound {} inbound {} credit {} sent {} received {}",
            self.ports.outbound.borrow().len(),
            self.ports.inbound.borrow().len(),
            if open { "open" } else { "closed" },
            self.num_sent,
            self.num_received
        )
    }
}
