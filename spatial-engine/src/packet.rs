// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Packets and the structures shared between a core and the network.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::rc::Rc;

use crate::routing::RoutingTree;
use crate::sim_error;
use crate::tensor::Tensor;
use crate::types::{NodeId, SimError, SimResult, TensorId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Id of the tensor being transferred.
    pub flow_id: TensorId,

    pub source: NodeId,

    /// Number of transfer units (flits).
    pub size: usize,

    pub path: Rc<RoutingTree>,

    pub payload: Tensor,
}

impl Packet {
    #[must_use]
    pub fn destinations(&self) -> &BTreeSet<NodeId> {
        self.path.destinations()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "packet t{} {}->{:?} ({} flits)",
            self.flow_id,
            self.source,
            self.path.destinations(),
            self.size
        )
    }
}

/// A queue of packets shared between a network interface and the network.
pub type PacketQueue = Rc<RefCell<VecDeque<Packet>>>;

#[must_use]
pub fn new_packet_queue() -> PacketQueue {
    Rc::new(RefCell::new(VecDeque::new()))
}

/// The pair of queues connecting one core to the network.
#[derive(Clone, Debug, Default)]
pub struct PortQueues {
    /// Packets waiting to be injected into the network.
    pub outbound: PacketQueue,

    /// Packets delivered to this core.
    pub inbound: PacketQueue,
}

impl PortQueues {
    #[must_use]
    pub fn new() -> Self {
        Self {
            outbound: new_packet_queue(),
            inbound: new_packet_queue(),
        }
    }
}

/// Per-node flags telling senders whether a node can accept more packets.
///
/// Cloning gives another handle onto the same flags.
#[derive(Clone, Debug)]
pub struct CreditBoard {
    open: Rc<RefCell<Vec<bool>>>,
}

impl CreditBoard {
    /// Create a board for `num_nodes` nodes, all open.
    #[must_use]
    pub fn new(num_nodes: usize) -> Self {
        Self {
            open: Rc::new(RefCell::new(vec![true; num_nodes])),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.open.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.open.borrow().is_empty()
    }

    pub fn set(&self, node: NodeId, open: bool) -> SimResult {
        match self.open.borrow_mut().get_mut(node) {
            Some(flag) => {
                *flag = open;
                Ok(())
            }
            None => sim_error!("credit board has no node {node}"),
        }
    }

    pub fn is_open(&self, node: NodeId) -> Result<bool, SimError> {
        match self.open.borrow().get(node) {
            Some(flag) => Ok(*flag),
            None => sim_error!("credit board has no node {node}"),
        }
    }

    /// True only if every node in `nodes` is open.
    pub fn all_open<'a>(
        &self,
        nodes: impl IntoIterator<Item = &'a NodeId>,
    ) -> Result<bool, SimError> {
        let mut all_open = true;
        for node in nodes {
            all_open &= self.is_open(*node)?;
        }
        Ok(all_open)
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<bool> {
        self.open.borrow().clone()
    }
}
