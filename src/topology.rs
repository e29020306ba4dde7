//! Undirected, weighted graph of switches and hosts.

use std::collections::HashMap;
use std::fmt;

use petgraph::algo::astar;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use crate::error::TopologyError;
use crate::ofp_controller::DeviceId;
use crate::packet::MacAddr;

pub type LinkWeight = u32;

/// A vertex of the topology.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    Switch(DeviceId),
    Host(MacAddr),
}

impl NodeId {
    pub fn as_switch(&self) -> Option<DeviceId> {
        match *self {
            NodeId::Switch(sw) => Some(sw),
            NodeId::Host(_) => None,
        }
    }

    pub fn as_host(&self) -> Option<MacAddr> {
        match *self {
            NodeId::Host(mac) => Some(mac),
            NodeId::Switch(_) => None,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Switch(sw) => sw.fmt(f),
            NodeId::Host(mac) => mac.fmt(f),
        }
    }
}

impl From<DeviceId> for NodeId {
    fn from(sw: DeviceId) -> NodeId {
        NodeId::Switch(sw)
    }
}

impl From<MacAddr> for NodeId {
    fn from(mac: MacAddr) -> NodeId {
        NodeId::Host(mac)
    }
}

/// Outcome of a cycle search. Finding no cycle is a regular result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleSearch {
    Acyclic,
    /// The first cycle found, as the sequence of its vertices.
    Cycle(Vec<NodeId>),
}

impl CycleSearch {
    pub fn has_cycle(&self) -> bool {
        matches!(self, CycleSearch::Cycle(_))
    }

    pub fn cycle(&self) -> Option<&[NodeId]> {
        match self {
            CycleSearch::Cycle(c) => Some(c),
            CycleSearch::Acyclic => None,
        }
    }
}

/// What `Topology::add_edge` did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EdgeUpdate {
    Added,
    Reweighted,
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    graph: UnGraph<NodeId, LinkWeight>,
    index: HashMap<NodeId, NodeIndex>,
}

impl Topology {
    pub fn new() -> Topology {
        Topology::default()
    }

    /// Add `id` unless it is already present, returning its graph index.
    pub fn add_node(&mut self, id: NodeId) -> NodeIndex {
        if let Some(&idx) = self.index.get(&id) {
            return idx;
        }
        let idx = self.graph.add_node(id);
        self.index.insert(id, idx);
        idx
    }

    /// Add the edge `a -- b`, adding missing endpoints. Adding an existing edge updates its weight.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId, weight: LinkWeight) -> EdgeUpdate {
        let ia = self.add_node(a);
        let ib = self.add_node(b);
        match self.graph.find_edge(ia, ib) {
            Some(e) if self.graph[e] == weight => EdgeUpdate::Unchanged,
            Some(e) => {
                self.graph[e] = weight;
                EdgeUpdate::Reweighted
            }
            None => {
                self.graph.add_edge(ia, ib, weight);
                EdgeUpdate::Added
            }
        }
    }

    /// Remove the edge `a -- b`. Both endpoints stay in the graph.
    pub fn remove_edge(&mut self, a: NodeId, b: NodeId) -> bool {
        let edge = match (self.index.get(&a), self.index.get(&b)) {
            (Some(&ia), Some(&ib)) => self.graph.find_edge(ia, ib),
            _ => None,
        };
        edge.and_then(|e| self.graph.remove_edge(e)).is_some()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    pub fn weight(&self, a: &NodeId, b: &NodeId) -> Option<LinkWeight> {
        let e = self.graph.find_edge(*self.index.get(a)?, *self.index.get(b)?)?;
        Some(self.graph[e])
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.graph.node_weights()
    }

    /// Search for a cycle with an iterative depth-first traversal, visiting roots in insertion
    /// order so that the answer only depends on the sequence of mutations.
    pub fn find_cycle(&self) -> CycleSearch {
        let n = self.graph.node_count();
        let mut parent: Vec<Option<NodeIndex>> = vec![None; n];
        let mut visited = vec![false; n];
        for root in self.graph.node_indices() {
            if visited[root.index()] {
                continue;
            }
            visited[root.index()] = true;
            let mut stack = vec![root];
            while let Some(u) = stack.pop() {
                let mut next: Vec<NodeIndex> = self.graph.neighbors(u).collect();
                next.sort();
                for v in next {
                    if v == u {
                        return CycleSearch::Cycle(vec![self.graph[u]]);
                    }
                    if !visited[v.index()] {
                        visited[v.index()] = true;
                        parent[v.index()] = Some(u);
                        stack.push(v);
                    } else if parent[u.index()] != Some(v) && parent[v.index()] != Some(u) {
                        return CycleSearch::Cycle(self.close_cycle(&parent, u, v));
                    }
                }
            }
        }
        CycleSearch::Acyclic
    }

    /// Join the tree paths of the endpoints of the non-tree edge `u -- v` at their lowest common
    /// ancestor.
    fn close_cycle(&self, parent: &[Option<NodeIndex>], u: NodeIndex, v: NodeIndex) -> Vec<NodeId> {
        let ancestors = |mut x: NodeIndex| {
            let mut chain = vec![x];
            while let Some(p) = parent[x.index()] {
                chain.push(p);
                x = p;
            }
            chain
        };
        let up = ancestors(u);
        let vp = ancestors(v);
        let (ui, vi) = up.iter()
            .enumerate()
            .find_map(|(i, a)| vp.iter().position(|b| b == a).map(|j| (i, j)))
            .unwrap_or((up.len() - 1, vp.len() - 1));
        up[..=ui]
            .iter()
            .chain(vp[..vi].iter().rev())
            .map(|&i| self.graph[i])
            .collect()
    }

    /// Weighted shortest path from `a` to `b`, both included.
    pub fn shortest_path(&self, a: &NodeId, b: &NodeId) -> Result<Vec<NodeId>, TopologyError> {
        let ia = *self.index.get(a).ok_or(TopologyError::NodeNotFound(*a))?;
        let ib = *self.index.get(b).ok_or(TopologyError::NodeNotFound(*b))?;
        astar(&self.graph, ia, |n| n == ib, |e| *e.weight(), |_| 0)
            .map(|(_, path)| path.into_iter().map(|i| self.graph[i]).collect())
            .ok_or(TopologyError::NoPath(*a, *b))
    }
}
