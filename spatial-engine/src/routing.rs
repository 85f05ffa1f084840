// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Multicast routing trees and the routing board that holds them.
//!
//! A routing board file contains one block per tensor:
//!
//! ```text
//! <tensor> <source> <dest> <dest>...
//! <start> <end> [<relay>...]
//! <start> <end> [<relay>...]
//!
//! ```
//!
//! The first line declares the tree root and destination set, each
//! following line adds one segment of the tree and a blank line ends the
//! block.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::rc::Rc;

use spatial_track::entity::Entity;
use spatial_track::{info, warn};

use crate::sim_error;
use crate::types::{NodeId, SimError, SimResult, TensorId};

/// A rooted multicast tree.
///
/// Each segment `start -> end` may pass through a list of relay nodes that
/// are not themselves part of the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingTree {
    root: NodeId,
    segments: BTreeMap<(NodeId, NodeId), Vec<NodeId>>,
    destinations: BTreeSet<NodeId>,
}

impl RoutingTree {
    #[must_use]
    pub fn new(root: NodeId) -> Self {
        Self {
            root,
            segments: BTreeMap::new(),
            destinations: BTreeSet::new(),
        }
    }

    /// A single-hop path from `source` to `dest`.
    #[must_use]
    pub fn direct(source: NodeId, dest: NodeId) -> Self {
        let mut tree = Self::new(source);
        tree.segments.insert((source, dest), Vec::new());
        tree.destinations.insert(dest);
        tree
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn destinations(&self) -> &BTreeSet<NodeId> {
        &self.destinations
    }

    pub fn set_destinations(&mut self, destinations: BTreeSet<NodeId>) {
        self.destinations = destinations;
    }

    #[must_use]
    pub fn is_destination(&self, node: NodeId) -> bool {
        self.destinations.contains(&node)
    }

    pub fn add_segment(&mut self, start: NodeId, end: NodeId, relays: Vec<NodeId>) -> SimResult {
        if start == end {
            return sim_error!("segment {start}-{end} loops back on itself");
        }
        if self.segments.insert((start, end), relays).is_some() {
            return sim_error!("segment {start}-{end} declared twice");
        }
        Ok(())
    }

    /// End nodes of all segments leaving `start`.
    pub fn segments_from(&self, start: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.segments
            .range((start, NodeId::MIN)..=(start, NodeId::MAX))
            .map(|((_, end), _)| *end)
    }

    #[must_use]
    pub fn relays(&self, start: NodeId, end: NodeId) -> Option<&[NodeId]> {
        self.segments.get(&(start, end)).map(Vec::as_slice)
    }

    /// Every node named by this tree (root, segment ends, relays and
    /// destinations).
    #[must_use]
    pub fn nodes(&self) -> BTreeSet<NodeId> {
        let mut nodes = BTreeSet::from([self.root]);
        for ((start, end), relays) in &self.segments {
            nodes.insert(*start);
            nodes.insert(*end);
            nodes.extend(relays.iter().copied());
        }
        nodes.extend(self.destinations.iter().copied());
        nodes
    }

    /// Number of hops from the root to `node`, counting relays.
    #[must_use]
    pub fn hops_to(&self, node: NodeId) -> Option<usize> {
        let mut pending = VecDeque::from([(self.root, 0)]);
        let mut seen = BTreeSet::new();
        while let Some((at, hops)) = pending.pop_front() {
            if at == node {
                return Some(hops);
            }
            if !seen.insert(at) {
                continue;
            }
            for end in self.segments_from(at) {
                let relays = self.relays(at, end).map_or(0, <[NodeId]>::len);
                pending.push_back((end, hops + relays + 1));
            }
        }
        None
    }

    /// Check that the segments form a tree that reaches every destination.
    pub fn validate(&self) -> SimResult {
        let mut reachable = BTreeSet::from([self.root]);
        let mut pending = vec![self.root];
        while let Some(at) = pending.pop() {
            for end in self.segments_from(at) {
                if reachable.insert(end) {
                    pending.push(end);
                }
            }
        }

        for (start, end) in self.segments.keys() {
            if !reachable.contains(start) {
                return sim_error!("segment {start}-{end} has no ancestor");
            }
            if self.segments_from(*end).next().is_none() && !self.is_destination(*end) {
                return sim_error!(
                    "segment {start}-{end} has no successor and does not reach a destination"
                );
            }
        }

        for dest in &self.destinations {
            if *dest == self.root || !reachable.contains(dest) {
                return sim_error!("destination {dest} is not reached from root {}", self.root);
            }
        }
        Ok(())
    }
}

impl fmt::Display for RoutingTree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "root {} -> {:?}", self.root, self.destinations)
    }
}

#[derive(PartialEq)]
enum ParseState {
    Init,
    Attribute,
    Segment,
}

/// The routing board: a multicast tree per tensor id.
///
/// Loaded once at startup and shared by every network interface.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoutingTable {
    trees: BTreeMap<TensorId, Rc<RoutingTree>>,
}

impl RoutingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the routing board.
    ///
    /// A missing file is not an error: the board is left empty and
    /// single-destination paths are synthesized when packets are built.
    pub fn from_file(parent: &Rc<Entity>, path: &Path) -> Result<Self, SimError> {
        match std::fs::read_to_string(path) {
            Ok(s) => {
                let table = Self::from_string(&s)?;
                info!(parent ; "Loaded {} routing trees from {}", table.len(), path.display());
                Ok(table)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(parent ;
                    "Routing board {} does not exist, the routing board is empty",
                    path.display()
                );
                Ok(Self::new())
            }
            Err(e) => sim_error!("Unable to read routing board {}: {e}", path.display()),
        }
    }

    pub fn from_string(board_str: &str) -> Result<Self, SimError> {
        let mut table = Self::new();
        let mut state = ParseState::Init;
        let mut current: Option<(TensorId, RoutingTree)> = None;

        for (i, line) in board_str.lines().enumerate() {
            let blank = line.trim().is_empty();
            let numbers = || parse_numbers(line, i + 1);
            match state {
                ParseState::Init if !blank => {
                    let fields = numbers()?;
                    let [tid, source, dests @ ..] = fields.as_slice() else {
                        return sim_error!(
                            "routing line {}: expected `<tensor> <source> <dest>...`",
                            i + 1
                        );
                    };
                    let mut tree = RoutingTree::new(to_node(*source, i + 1)?);
                    let dests = dests
                        .iter()
                        .map(|d| to_node(*d, i + 1))
                        .collect::<Result<BTreeSet<_>, _>>()?;
                    tree.set_destinations(dests);
                    current = Some((*tid, tree));
                    state = ParseState::Attribute;
                }
                ParseState::Attribute | ParseState::Segment if !blank => {
                    let fields = numbers()?;
                    let [start, end, relays @ ..] = fields.as_slice() else {
                        return sim_error!(
                            "routing line {}: expected `<start> <end> <relay>...`",
                            i + 1
                        );
                    };
                    let relays = relays
                        .iter()
                        .map(|r| to_node(*r, i + 1))
                        .collect::<Result<Vec<_>, _>>()?;
                    if let Some((tid, tree)) = current.as_mut() {
                        tree.add_segment(to_node(*start, i + 1)?, to_node(*end, i + 1)?, relays)
                            .map_err(|e| tree_error(*tid, &e))?;
                    }
                    state = ParseState::Segment;
                }
                ParseState::Segment => {
                    if let Some((tid, tree)) = current.take() {
                        table.insert(tid, tree)?;
                    }
                    state = ParseState::Init;
                }
                _ => {}
            }
        }

        // The final block need not be followed by a blank line
        if let Some((tid, tree)) = current.take() {
            table.insert(tid, tree)?;
        }
        Ok(table)
    }

    /// Validate and add the tree for tensor `tid`.
    pub fn insert(&mut self, tid: TensorId, tree: RoutingTree) -> SimResult {
        tree.validate().map_err(|e| tree_error(tid, &e))?;
        if self.trees.insert(tid, Rc::new(tree)).is_some() {
            return sim_error!("routing tree for tensor {tid} declared twice");
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, tid: TensorId) -> Option<&Rc<RoutingTree>> {
        self.trees.get(&tid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Check that every tree only names nodes of an array of `num_nodes`.
    pub fn check_nodes(&self, num_nodes: usize) -> SimResult {
        for (tid, tree) in &self.trees {
            if let Some(node) = tree.nodes().into_iter().find(|n| *n >= num_nodes) {
                return sim_error!(
                    "routing tree for tensor {tid} names node {node} outside an array of {num_nodes}"
                );
            }
        }
        Ok(())
    }
}

fn tree_error(tid: TensorId, e: &SimError) -> SimError {
    SimError(format!("routing tree for tensor {tid}: {}", e.0))
}

fn parse_numbers(line: &str, line_num: usize) -> Result<Vec<i64>, SimError> {
    line.split_whitespace()
        .map(|f| {
            f.parse::<i64>()
                .map_err(|_| SimError(format!("routing line {line_num}: invalid number `{f}`")))
        })
        .collect()
}

fn to_node(value: i64, line_num: usize) -> Result<NodeId, SimError> {
    NodeId::try_from(value)
        .map_err(|_| SimError(format!("routing line {line_num}: invalid node {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOARD: &str = "\
5 0 2 3
0 1
1 2
1 3 7

9 4 1
4 1 5 6
";

    #[test]
    fn parse_board() {
        let table = RoutingTable::from_string(BOARD).unwrap();
        assert_eq!(table.len(), 2);

        let tree = table.get(5).unwrap();
        assert_eq!(tree.root(), 0);
        assert_eq!(tree.destinations(), &BTreeSet::from([2, 3]));
        assert_eq!(tree.segments_from(1).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(tree.relays(1, 3), Some(&[7][..]));
        assert_eq!(tree.hops_to(2), Some(2));
        assert_eq!(tree.hops_to(3), Some(3));

        let tree = table.get(9).unwrap();
        assert_eq!(tree.hops_to(1), Some(3));
        assert!(table.get(1).is_none());
    }

    #[test]
    fn orphan_segment() {
        let err = RoutingTable::from_string("5 0 2\n0 2\n3 2\n").unwrap_err();
        assert!(err.0.contains("routing tree for tensor 5"));
        assert!(err.0.contains("no ancestor"));
    }

    #[test]
    fn dangling_leaf() {
        let err = RoutingTable::from_string("5 0 2\n0 1\n0 2\n").unwrap_err();
        assert!(err.0.contains("routing tree for tensor 5"));
        assert!(err.0.contains("no successor"));
    }

    #[test]
    fn unreached_destination() {
        let err = RoutingTable::from_string("5 0 2 3\n0 2\n").unwrap_err();
        assert!(err.0.contains("destination 3 is not reached"));
    }

    #[test]
    fn duplicate_tensor() {
        let err = RoutingTable::from_string("5 0 2\n0 2\n\n5 0 2\n0 2\n").unwrap_err();
        assert!(err.0.contains("declared twice"));
    }

    #[test]
    fn nodes_outside_array() {
        let table = RoutingTable::from_string(BOARD).unwrap();
        assert!(table.check_nodes(8).is_ok());
        let err = table.check_nodes(4).unwrap_err();
        assert!(err.0.contains("outside an array of 4"));
    }

    #[test]
    fn direct_path() {
        let tree = RoutingTree::direct(3, 1);
        assert!(tree.validate().is_ok());
        assert_eq!(tree.hops_to(1), Some(1));
    }
}
