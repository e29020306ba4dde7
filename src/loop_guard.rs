//! Broadcast containment: tracks whether the topology has a cycle and restricts flooding to the
//! spanning tree while it does.

use log::{debug, info};

use crate::discovery::{Discovery, SpanningTree};
use crate::ofp_controller::DeviceId;
use crate::openflow0x01::{PseudoPort, OFPP_MAX};
use crate::topology::{CycleSearch, NodeId, Topology};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BroadcastState {
    /// No cycle known; floods may use every port.
    Normal,
    /// A cycle exists; floods follow the cached spanning tree.
    LoopDetected,
}

#[derive(Debug, Clone, Default)]
pub struct LoopGuard {
    cycle: Option<Vec<NodeId>>,
    tree: SpanningTree,
}

impl LoopGuard {
    pub fn new() -> LoopGuard {
        LoopGuard::default()
    }

    pub fn state(&self) -> BroadcastState {
        match self.cycle {
            Some(_) => BroadcastState::LoopDetected,
            None => BroadcastState::Normal,
        }
    }

    /// The cycle found by the last refresh.
    pub fn cycle(&self) -> Option<&[NodeId]> {
        self.cycle.as_deref()
    }

    pub fn spanning_tree(&self) -> &SpanningTree {
        &self.tree
    }

    /// Re-run cycle detection after a topology change. A cycle caches a fresh spanning tree from
    /// `discovery`; no cycle clears the cache.
    pub fn refresh(&mut self, topology: &Topology, discovery: &dyn Discovery) -> BroadcastState {
        let before = self.state();
        match topology.find_cycle() {
            CycleSearch::Cycle(cycle) => {
                self.tree = discovery.spanning_tree();
                debug!("loop {:?}, spanning tree {:?}", cycle, self.tree);
                self.cycle = Some(cycle);
            }
            CycleSearch::Acyclic => {
                self.cycle = None;
                self.tree = SpanningTree::default();
            }
        }
        let after = self.state();
        if before != after {
            info!("broadcast state {:?} -> {:?}", before, after);
        }
        after
    }

    /// Output ports for flooding from `device` while a loop exists: every normal port, leaving
    /// out switch-to-switch ports that are not on the spanning tree. The switch itself never
    /// sends a frame back out of its ingress port.
    pub fn flood_ports(&self,
                       device: DeviceId,
                       ports: &[u16],
                       discovery: &dyn Discovery)
                       -> Vec<PseudoPort> {
        ports.iter()
            .copied()
            .filter(|&p| p < OFPP_MAX)
            .filter(|&p| discovery.is_edge_port(device, p) || self.tree.contains(device, p))
            .map(PseudoPort::PhysicalPort)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{LinkDiscovery, LinkEvent};
    use pretty_assertions::assert_eq;

    fn s(n: u64) -> NodeId {
        NodeId::Switch(DeviceId(n))
    }

    #[test]
    fn enters_and_leaves_loop_state() {
        let mut topology = Topology::new();
        let mut discovery = LinkDiscovery::new();
        let mut guard = LoopGuard::new();
        let links = [LinkEvent::new(DeviceId(1), 2, DeviceId(2), 1),
                     LinkEvent::new(DeviceId(2), 2, DeviceId(3), 1),
                     LinkEvent::new(DeviceId(3), 2, DeviceId(1), 3)];
        for link in &links {
            topology.add_edge(s(link.a.0), s(link.b.0), 100);
            discovery.link_up(link);
        }
        assert_eq!(guard.refresh(&topology, &discovery), BroadcastState::LoopDetected);
        assert!(guard.cycle().is_some());
        assert!(!guard.spanning_tree().is_empty());

        // s2 port 2 is an inter-switch port outside the tree
        let ports = guard.flood_ports(DeviceId(2), &[1, 2, 5, 6, 0xfffe], &discovery);
        assert_eq!(ports,
                   vec![PseudoPort::PhysicalPort(1),
                        PseudoPort::PhysicalPort(5),
                        PseudoPort::PhysicalPort(6)]);

        topology.remove_edge(s(2), s(3));
        discovery.link_down(&links[1]);
        assert_eq!(guard.refresh(&topology, &discovery), BroadcastState::Normal);
        assert!(guard.cycle().is_none());
        assert!(guard.spanning_tree().is_empty());
    }
}
