//! Keeps the topology graph, port maps and loop state in step with discovery events.

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::discovery::{Discovery, HostEvent, LinkEvent};
use crate::loop_guard::{BroadcastState, LoopGuard};
use crate::ofp_controller::DeviceId;
use crate::packet::MacAddr;
use crate::topology::{EdgeUpdate, LinkWeight, NodeId, Topology};

/// `(switch a, switch b) -> (port on a, port on b)` for every observed direction of a link.
#[derive(Debug, Clone, Default)]
pub struct LinkPortMap {
    links: HashMap<(DeviceId, DeviceId), (u16, u16)>,
}

impl LinkPortMap {
    pub fn insert(&mut self, link: &LinkEvent) {
        self.links.insert((link.a, link.b), (link.port_a, link.port_b));
    }

    /// Forget both directions of the link between `a` and `b`.
    pub fn remove(&mut self, a: DeviceId, b: DeviceId) {
        self.links.remove(&(a, b));
        self.links.remove(&(b, a));
    }

    /// Ports exactly as recorded for the directed observation `(a, b)`.
    pub fn get(&self, a: DeviceId, b: DeviceId) -> Option<(u16, u16)> {
        self.links.get(&(a, b)).copied()
    }

    /// `(port on this, port on other)` of the link between the two switches. The observation
    /// `(this, other)` wins; otherwise the reverse observation is used with its ports swapped.
    pub fn ports_towards(&self, this: DeviceId, other: DeviceId) -> Option<(u16, u16)> {
        self.get(this, other).or_else(|| self.get(other, this).map(|(o, t)| (t, o)))
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Last known attachment point of every host.
#[derive(Debug, Clone, Default)]
pub struct HostLocationMap {
    hosts: HashMap<MacAddr, (DeviceId, u16)>,
}

impl HostLocationMap {
    pub fn insert(&mut self, mac: MacAddr, device: DeviceId, port: u16) -> Option<(DeviceId, u16)> {
        self.hosts.insert(mac, (device, port))
    }

    pub fn get(&self, mac: MacAddr) -> Option<(DeviceId, u16)> {
        self.hosts.get(&mac).copied()
    }

    /// Port of `device` that `mac` is attached to, if it is attached to that switch.
    pub fn port_on(&self, mac: MacAddr, device: DeviceId) -> Option<u16> {
        match self.get(mac) {
            Some((sw, port)) if sw == device => Some(port),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Result of consuming a link event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LinkChange {
    pub edge: EdgeUpdate,
    pub state: BroadcastState,
}

pub struct TopologyTracker {
    topology: Topology,
    links: LinkPortMap,
    hosts: HostLocationMap,
    loops: LoopGuard,
    discovery: Box<dyn Discovery>,
    switch_link_weight: LinkWeight,
    host_link_weight: LinkWeight,
}

impl TopologyTracker {
    pub fn new(discovery: Box<dyn Discovery>,
               switch_link_weight: LinkWeight,
               host_link_weight: LinkWeight)
               -> TopologyTracker {
        TopologyTracker {
            topology: Topology::new(),
            links: LinkPortMap::default(),
            hosts: HostLocationMap::default(),
            loops: LoopGuard::new(),
            discovery,
            switch_link_weight,
            host_link_weight,
        }
    }

    pub fn switch_up(&mut self, sw: DeviceId) {
        self.topology.add_node(NodeId::Switch(sw));
    }

    /// Record a link between two switches and re-evaluate the broadcast state.
    pub fn link_up(&mut self, link: &LinkEvent) -> LinkChange {
        self.links.insert(link);
        let edge = self.topology.add_edge(NodeId::Switch(link.a),
                                          NodeId::Switch(link.b),
                                          self.switch_link_weight);
        self.discovery.link_up(link);
        if edge != EdgeUpdate::Unchanged {
            info!("link {}:{} -- {}:{} ({:?})",
                  link.a,
                  link.port_a,
                  link.b,
                  link.port_b,
                  edge);
        }
        let state = self.loops.refresh(&self.topology, self.discovery.as_ref());
        LinkChange { edge, state }
    }

    /// Forget a link between two switches. While a parallel link between the pair survives,
    /// the graph edge stays and the port map moves over to that link. Returns whether the ports
    /// used between the two switches changed.
    pub fn link_down(&mut self, link: &LinkEvent) -> bool {
        self.discovery.link_down(link);
        let before = self.links.ports_towards(link.a, link.b);
        self.links.remove(link.a, link.b);
        let changed = match self.discovery.link_ports(link.a, link.b) {
            Some((pa, pb)) => {
                self.links.insert(&LinkEvent::new(link.a, pa, link.b, pb));
                debug!("link {}:{} -- {}:{} removed, {}:{} -- {}:{} remains",
                       link.a,
                       link.port_a,
                       link.b,
                       link.port_b,
                       link.a,
                       pa,
                       link.b,
                       pb);
                before != Some((pa, pb))
            }
            None => {
                let removed = self.topology
                    .remove_edge(NodeId::Switch(link.a), NodeId::Switch(link.b));
                if removed {
                    info!("link {}:{} -- {}:{} removed", link.a, link.port_a, link.b, link.port_b);
                } else {
                    debug!("removal of unknown link {} -- {}", link.a, link.b);
                }
                removed
            }
        };
        self.loops.refresh(&self.topology, self.discovery.as_ref());
        changed
    }

    /// Record where a host is attached. Returns the previous attachment point if the host moved.
    /// A host that moved to another switch loses its edge to the old one.
    pub fn host_up(&mut self, host: &HostEvent) -> Option<(DeviceId, u16)> {
        let moved = self.hosts
            .insert(host.mac, host.device, host.port)
            .filter(|&prev| prev != (host.device, host.port));
        if let Some((sw, port)) = moved {
            warn!("host {} moved from {}:{} to {}:{}",
                  host.mac,
                  sw,
                  port,
                  host.device,
                  host.port);
            if sw != host.device {
                self.topology.remove_edge(NodeId::Switch(sw), NodeId::Host(host.mac));
            }
        }
        self.topology.add_edge(NodeId::Switch(host.device),
                               NodeId::Host(host.mac),
                               self.host_link_weight);
        moved
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn links(&self) -> &LinkPortMap {
        &self.links
    }

    pub fn hosts(&self) -> &HostLocationMap {
        &self.hosts
    }

    pub fn loops(&self) -> &LoopGuard {
        &self.loops
    }

    pub fn discovery(&self) -> &dyn Discovery {
        self.discovery.as_ref()
    }

    pub fn broadcast_state(&self) -> BroadcastState {
        self.loops.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::LinkDiscovery;
    use pretty_assertions::assert_eq;

    fn tracker() -> TopologyTracker {
        TopologyTracker::new(Box::new(LinkDiscovery::new()), 100, 10)
    }

    #[test]
    fn reverse_observation_swaps_ports() {
        let mut map = LinkPortMap::default();
        map.insert(&LinkEvent::new(DeviceId(1), 2, DeviceId(2), 1));
        assert_eq!(map.ports_towards(DeviceId(1), DeviceId(2)), Some((2, 1)));
        assert_eq!(map.ports_towards(DeviceId(2), DeviceId(1)), Some((1, 2)));
        assert_eq!(map.get(DeviceId(2), DeviceId(1)), None);
        assert_eq!(map.ports_towards(DeviceId(2), DeviceId(3)), None);
    }

    #[test]
    fn links_and_hosts_build_the_graph() {
        let mut t = tracker();
        let link = LinkEvent::new(DeviceId(1), 2, DeviceId(2), 1);
        let change = t.link_up(&link);
        assert_eq!(change, LinkChange { edge: EdgeUpdate::Added, state: BroadcastState::Normal });
        assert_eq!(t.link_up(&link.reversed()).edge, EdgeUpdate::Unchanged);
        assert_eq!(t.links().len(), 2);

        let mac = MacAddr::new(0x0a);
        t.host_up(&HostEvent { device: DeviceId(1), port: 1, mac });
        assert_eq!(t.hosts().get(mac), Some((DeviceId(1), 1)));
        assert_eq!(t.hosts().port_on(mac, DeviceId(2)), None);
        assert_eq!(t.topology().weight(&NodeId::Host(mac), &NodeId::Switch(DeviceId(1))),
                   Some(10));
        assert_eq!(t.topology().weight(&NodeId::Switch(DeviceId(2)), &NodeId::Switch(DeviceId(1))),
                   Some(100));

        assert_eq!(t.host_up(&HostEvent { device: DeviceId(1), port: 1, mac }), None);
        assert_eq!(t.host_up(&HostEvent { device: DeviceId(1), port: 4, mac }),
                   Some((DeviceId(1), 1)));
        assert_eq!(t.hosts().get(mac), Some((DeviceId(1), 4)));

        assert_eq!(t.host_up(&HostEvent { device: DeviceId(2), port: 3, mac }),
                   Some((DeviceId(1), 4)));
        assert_eq!(t.topology().weight(&NodeId::Host(mac), &NodeId::Switch(DeviceId(1))), None);
        assert_eq!(t.topology().weight(&NodeId::Host(mac), &NodeId::Switch(DeviceId(2))),
                   Some(10));
    }

    #[test]
    fn closing_and_opening_a_ring() {
        let mut t = tracker();
        t.link_up(&LinkEvent::new(DeviceId(1), 2, DeviceId(2), 1));
        t.link_up(&LinkEvent::new(DeviceId(2), 2, DeviceId(3), 1));
        let last = LinkEvent::new(DeviceId(3), 2, DeviceId(1), 3);
        assert_eq!(t.link_up(&last).state, BroadcastState::LoopDetected);
        assert_eq!(t.broadcast_state(), BroadcastState::LoopDetected);
        assert!(!t.discovery().is_edge_port(DeviceId(1), 3));

        assert!(t.link_down(&last));
        assert_eq!(t.broadcast_state(), BroadcastState::Normal);
        assert_eq!(t.links().get(DeviceId(3), DeviceId(1)), None);
        assert!(t.discovery().is_edge_port(DeviceId(1), 3));
        assert!(!t.link_down(&last));
    }

    #[test]
    fn parallel_link_keeps_the_edge() {
        let mut t = tracker();
        let first = LinkEvent::new(DeviceId(1), 1, DeviceId(2), 5);
        let second = LinkEvent::new(DeviceId(1), 2, DeviceId(2), 4);
        t.link_up(&first);
        t.link_up(&second);
        assert_eq!(t.topology().edge_count(), 1);
        assert_eq!(t.links().ports_towards(DeviceId(1), DeviceId(2)), Some((2, 4)));

        // the mapped link fails: traffic moves to the other one
        assert!(t.link_down(&second));
        assert_eq!(t.topology().weight(&NodeId::Switch(DeviceId(1)), &NodeId::Switch(DeviceId(2))),
                   Some(100));
        assert_eq!(t.links().ports_towards(DeviceId(2), DeviceId(1)), Some((5, 1)));

        // losing the unmapped link changes nothing
        t.link_up(&second);
        assert!(!t.link_down(&first));
        assert_eq!(t.links().ports_towards(DeviceId(1), DeviceId(2)), Some((2, 4)));

        assert!(t.link_down(&second.reversed()));
        assert_eq!(t.topology().edge_count(), 0);
        assert!(t.links().is_empty());
    }
}
