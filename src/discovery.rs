//! Events and queries of the link-discovery and host-tracking collaborators.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::trace;

use crate::ofp_controller::DeviceId;
use crate::packet::MacAddr;

/// A directed observation of a link: port `port_a` of switch `a` reaches port `port_b` of
/// switch `b`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LinkEvent {
    pub a: DeviceId,
    pub port_a: u16,
    pub b: DeviceId,
    pub port_b: u16,
}

impl LinkEvent {
    pub fn new(a: DeviceId, port_a: u16, b: DeviceId, port_b: u16) -> LinkEvent {
        LinkEvent { a, port_a, b, port_b }
    }

    /// The same link observed from the other end.
    pub fn reversed(&self) -> LinkEvent {
        LinkEvent::new(self.b, self.port_b, self.a, self.port_a)
    }
}

/// A host `mac` was seen attached to `port` of switch `device`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HostEvent {
    pub device: DeviceId,
    pub port: u16,
    pub mac: MacAddr,
}

/// Ports of each switch that lie on a loop-free subgraph of the switch topology.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpanningTree(BTreeMap<DeviceId, Vec<u16>>);

impl SpanningTree {
    /// Tree ports of `device`, empty if the switch is not part of the tree.
    pub fn ports(&self, device: DeviceId) -> &[u16] {
        self.0.get(&device).map(|p| p.as_slice()).unwrap_or(&[])
    }

    pub fn contains(&self, device: DeviceId, port: u16) -> bool {
        self.ports(device).contains(&port)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(DeviceId, Vec<u16>)> for SpanningTree {
    fn from_iter<I: IntoIterator<Item = (DeviceId, Vec<u16>)>>(iter: I) -> SpanningTree {
        SpanningTree(iter.into_iter().collect())
    }
}

/// Link-discovery collaborator.
pub trait Discovery: Send {
    /// Called by the controller for every link it consumes.
    fn link_up(&mut self, link: &LinkEvent);
    /// Called by the controller for every link removal it consumes.
    fn link_down(&mut self, link: &LinkEvent);
    /// `(port on a, port on b)` of a link between `a` and `b` that is still up. With parallel
    /// links, the one with the lowest port on `a`.
    fn link_ports(&self, a: DeviceId, b: DeviceId) -> Option<(u16, u16)>;
    /// Whether `port` of `device` faces something other than another switch.
    fn is_edge_port(&self, device: DeviceId, port: u16) -> bool;
    /// A spanning tree over the currently known switch links.
    fn spanning_tree(&self) -> SpanningTree;
}

/// Discovery view built from the link events the controller forwards to it.
#[derive(Debug, Default)]
pub struct LinkDiscovery {
    /// switch -> neighbour -> (local port, neighbour port) of every link between the two
    adjacency: BTreeMap<DeviceId, BTreeMap<DeviceId, BTreeSet<(u16, u16)>>>,
}

impl LinkDiscovery {
    pub fn new() -> LinkDiscovery {
        LinkDiscovery::default()
    }

    fn insert(&mut self, a: DeviceId, ports: (u16, u16), b: DeviceId) {
        self.adjacency.entry(a).or_default().entry(b).or_default().insert(ports);
    }

    fn remove(&mut self, a: DeviceId, ports: (u16, u16), b: DeviceId) {
        if let Some(peers) = self.adjacency.get_mut(&a) {
            if let Some(links) = peers.get_mut(&b) {
                links.remove(&ports);
                if links.is_empty() {
                    peers.remove(&b);
                }
            }
            if peers.is_empty() {
                self.adjacency.remove(&a);
            }
        }
    }
}

impl Discovery for LinkDiscovery {
    fn link_up(&mut self, link: &LinkEvent) {
        self.insert(link.a, (link.port_a, link.port_b), link.b);
        self.insert(link.b, (link.port_b, link.port_a), link.a);
    }

    fn link_down(&mut self, link: &LinkEvent) {
        self.remove(link.a, (link.port_a, link.port_b), link.b);
        self.remove(link.b, (link.port_b, link.port_a), link.a);
    }

    fn link_ports(&self, a: DeviceId, b: DeviceId) -> Option<(u16, u16)> {
        self.adjacency.get(&a)?.get(&b)?.iter().next().copied()
    }

    fn is_edge_port(&self, device: DeviceId, port: u16) -> bool {
        !self.adjacency
            .get(&device)
            .map(|peers| peers.values().flatten().any(|&(local, _)| local == port))
            .unwrap_or(false)
    }

    /// Breadth-first tree grown from the lowest datapath id of every connected component.
    fn spanning_tree(&self) -> SpanningTree {
        let mut tree: BTreeMap<DeviceId, Vec<u16>> = BTreeMap::new();
        let mut done: BTreeSet<DeviceId> = BTreeSet::new();
        for &root in self.adjacency.keys() {
            if !done.insert(root) {
                continue;
            }
            let mut queue = VecDeque::from([root]);
            while let Some(sw) = queue.pop_front() {
                let peers = match self.adjacency.get(&sw) {
                    Some(peers) => peers,
                    None => continue,
                };
                for &peer in peers.keys() {
                    if done.contains(&peer) {
                        continue;
                    }
                    if let Some((local, remote)) = self.link_ports(sw, peer) {
                        trace!("tree link {}:{} -- {}:{}", sw, local, peer, remote);
                        tree.entry(sw).or_default().push(local);
                        tree.entry(peer).or_default().push(remote);
                        done.insert(peer);
                        queue.push_back(peer);
                    }
                }
            }
        }
        tree.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sw(n: u64) -> DeviceId {
        DeviceId(n)
    }

    fn ring() -> LinkDiscovery {
        let mut d = LinkDiscovery::new();
        d.link_up(&LinkEvent::new(sw(1), 2, sw(2), 1));
        d.link_up(&LinkEvent::new(sw(2), 2, sw(3), 1));
        d.link_up(&LinkEvent::new(sw(3), 2, sw(1), 3));
        d
    }

    #[test]
    fn edge_ports() {
        let d = ring();
        assert!(!d.is_edge_port(sw(1), 2));
        assert!(!d.is_edge_port(sw(1), 3));
        assert!(d.is_edge_port(sw(1), 1));
        assert!(d.is_edge_port(sw(9), 1));
    }

    #[test]
    fn ring_tree_drops_one_link() {
        let tree = ring().spanning_tree();
        // rooted at s1, reaching s2 and s3 directly; the s2 -- s3 link is cut
        assert_eq!(tree.ports(sw(1)), &[2, 3]);
        assert_eq!(tree.ports(sw(2)), &[1]);
        assert_eq!(tree.ports(sw(3)), &[2]);
        assert!(!tree.contains(sw(2), 2));
    }

    #[test]
    fn link_down_forgets_ports() {
        let mut d = ring();
        d.link_down(&LinkEvent::new(sw(2), 2, sw(3), 1));
        assert!(d.is_edge_port(sw(2), 2));
        assert!(d.is_edge_port(sw(3), 1));
        let tree = d.spanning_tree();
        assert_eq!(tree.ports(sw(1)), &[2, 3]);
        assert_eq!(d.link_ports(sw(2), sw(3)), None);
    }

    #[test]
    fn parallel_links_are_kept_apart() {
        let mut d = LinkDiscovery::new();
        d.link_up(&LinkEvent::new(sw(1), 1, sw(2), 5));
        d.link_up(&LinkEvent::new(sw(1), 2, sw(2), 4));
        assert_eq!(d.link_ports(sw(1), sw(2)), Some((1, 5)));
        assert_eq!(d.link_ports(sw(2), sw(1)), Some((4, 2)));

        d.link_down(&LinkEvent::new(sw(2), 5, sw(1), 1));
        assert!(d.is_edge_port(sw(1), 1));
        assert!(!d.is_edge_port(sw(2), 4));
        assert_eq!(d.link_ports(sw(1), sw(2)), Some((2, 4)));
        assert_eq!(d.spanning_tree().ports(sw(2)), &[4]);
    }
}
