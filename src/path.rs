//! Translation of host-to-host paths into per-switch flow rules, and the cache of paths already
//! installed.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::error::PathError;
use crate::ofp_controller::DeviceId;
use crate::openflow0x01::message::{add_flow, delete_flow_strict};
use crate::openflow0x01::{Action, FlowMod, Pattern, PseudoPort};
use crate::packet::MacAddr;
use crate::tracker::{HostLocationMap, LinkPortMap};
use crate::topology::NodeId;

/// Where frames of an installed path enter and leave one switch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Hop {
    pub device: DeviceId,
    pub in_port: u16,
    pub out_port: u16,
}

/// A path whose rules were sent to the switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPath {
    pub src: MacAddr,
    pub dst: MacAddr,
    pub nodes: Vec<NodeId>,
    pub hops: Vec<Hop>,
}

impl InstalledPath {
    /// Resolve the hops of `nodes`, which must run from one host to another.
    pub fn resolve(nodes: Vec<NodeId>,
                   links: &LinkPortMap,
                   hosts: &HostLocationMap)
                   -> Result<InstalledPath, PathError> {
        let (src, dst) = endpoints(&nodes)?;
        let hops = resolve_hops(&nodes, links, hosts)?;
        Ok(InstalledPath { src, dst, nodes, hops })
    }

    /// Whether the path walks over the edge `a -- b` in either direction.
    pub fn crosses(&self, a: &NodeId, b: &NodeId) -> bool {
        self.nodes
            .windows(2)
            .any(|w| (&w[0] == a && &w[1] == b) || (&w[0] == b && &w[1] == a))
    }

    fn pattern(&self, hop: &Hop) -> Pattern {
        Pattern {
            in_port: Some(hop.in_port),
            ..Pattern::between(self.src, self.dst)
        }
    }

    /// One flow mod per hop, forwarding `src -> dst` frames from the hop's in-port to its
    /// out-port. The rules never expire.
    pub fn flow_mods(&self, priority: u16) -> Vec<(DeviceId, FlowMod)> {
        self.hops
            .iter()
            .map(|hop| {
                let actions = vec![Action::Output(PseudoPort::PhysicalPort(hop.out_port))];
                (hop.device, add_flow(priority, self.pattern(hop), actions))
            })
            .collect()
    }

    /// Flow mods removing the rules of `flow_mods`.
    pub fn delete_mods(&self, priority: u16) -> Vec<(DeviceId, FlowMod)> {
        self.hops
            .iter()
            .map(|hop| (hop.device, delete_flow_strict(priority, self.pattern(hop))))
            .collect()
    }
}

/// Source and destination host of a path.
pub fn endpoints(nodes: &[NodeId]) -> Result<(MacAddr, MacAddr), PathError> {
    match (nodes.first().and_then(NodeId::as_host), nodes.last().and_then(NodeId::as_host)) {
        (Some(src), Some(dst)) if nodes.len() > 2 => Ok((src, dst)),
        _ => Err(PathError::NotHostToHost(nodes.to_vec())),
    }
}

/// Port of `this` facing the path neighbour `other`.
fn port_facing(this: DeviceId,
               other: &NodeId,
               links: &LinkPortMap,
               hosts: &HostLocationMap)
               -> Result<u16, PathError> {
    match *other {
        NodeId::Host(mac) => hosts.port_on(mac, this).ok_or(PathError::UnknownHostPort(mac, this)),
        NodeId::Switch(sw) => {
            links.ports_towards(this, sw)
                .map(|(mine, _)| mine)
                .ok_or(PathError::UnknownLink(this, sw))
        }
    }
}

/// In- and out-port of every interior switch of `nodes`. Fails on the first switch whose
/// neighbours cannot be mapped to ports.
pub fn resolve_hops(nodes: &[NodeId],
                    links: &LinkPortMap,
                    hosts: &HostLocationMap)
                    -> Result<Vec<Hop>, PathError> {
    nodes.windows(3)
        .map(|w| -> Result<Hop, PathError> {
            let device = w[1].as_switch().ok_or_else(|| PathError::NotHostToHost(nodes.to_vec()))?;
            Ok(Hop {
                device,
                in_port: port_facing(device, &w[0], links, hosts)?,
                out_port: port_facing(device, &w[2], links, hosts)?,
            })
        })
        .collect()
}

/// Installed paths by ordered `(src, dst)` pair.
#[derive(Debug, Clone, Default)]
pub struct PathCache {
    paths: HashMap<(MacAddr, MacAddr), InstalledPath>,
}

impl PathCache {
    pub fn new() -> PathCache {
        PathCache::default()
    }

    pub fn contains(&self, src: MacAddr, dst: MacAddr) -> bool {
        self.paths.contains_key(&(src, dst))
    }

    pub fn get(&self, src: MacAddr, dst: MacAddr) -> Option<&InstalledPath> {
        self.paths.get(&(src, dst))
    }

    /// Store `path` unless its pair already has one. Returns whether it was stored.
    pub fn insert(&mut self, path: InstalledPath) -> bool {
        match self.paths.entry((path.src, path.dst)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(e) => {
                e.insert(path);
                true
            }
        }
    }

    /// Drop and return every cached path that walks over `a -- b`.
    pub fn invalidate_edge(&mut self, a: &NodeId, b: &NodeId) -> Vec<InstalledPath> {
        self.invalidate_where(|p| p.crosses(a, b))
    }

    /// Drop and return every cached path that passes through `node`.
    pub fn invalidate_node(&mut self, node: &NodeId) -> Vec<InstalledPath> {
        self.invalidate_where(|p| p.nodes.contains(node))
    }

    fn invalidate_where<F: Fn(&InstalledPath) -> bool>(&mut self, stale: F) -> Vec<InstalledPath> {
        let keys: Vec<(MacAddr, MacAddr)> = self.paths
            .iter()
            .filter(|(_, p)| stale(p))
            .map(|(k, _)| *k)
            .collect();
        keys.into_iter().filter_map(|k| self.paths.remove(&k)).collect()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::LinkEvent;
    use crate::openflow0x01::{FlowModCmd, Timeout};
    use pretty_assertions::assert_eq;

    fn s(n: u64) -> NodeId {
        NodeId::Switch(DeviceId(n))
    }

    fn h(n: u64) -> NodeId {
        NodeId::Host(MacAddr::new(n))
    }

    /// x -- s1 -- s2 -- s3 -- y
    fn maps() -> (LinkPortMap, HostLocationMap) {
        let mut links = LinkPortMap::default();
        links.insert(&LinkEvent::new(DeviceId(1), 2, DeviceId(2), 1));
        links.insert(&LinkEvent::new(DeviceId(3), 1, DeviceId(2), 2));
        let mut hosts = HostLocationMap::default();
        hosts.insert(MacAddr::new(10), DeviceId(1), 1);
        hosts.insert(MacAddr::new(11), DeviceId(3), 3);
        (links, hosts)
    }

    #[test]
    fn hops_of_a_three_switch_path() {
        let (links, hosts) = maps();
        let path = InstalledPath::resolve(vec![h(10), s(1), s(2), s(3), h(11)], &links, &hosts)
            .unwrap();
        assert_eq!(path.hops,
                   vec![Hop { device: DeviceId(1), in_port: 1, out_port: 2 },
                        Hop { device: DeviceId(2), in_port: 1, out_port: 2 },
                        Hop { device: DeviceId(3), in_port: 1, out_port: 3 }]);

        let mods = path.flow_mods(100);
        let (dev, fm) = &mods[1];
        assert_eq!(*dev, DeviceId(2));
        assert_eq!(fm.priority, 100);
        assert_eq!(fm.pattern.in_port, Some(1));
        assert_eq!(fm.pattern.dl_src, Some(MacAddr::new(10)));
        assert_eq!(fm.pattern.dl_dst, Some(MacAddr::new(11)));
        assert_eq!(fm.actions, vec![Action::Output(PseudoPort::PhysicalPort(2))]);
        assert_eq!(fm.idle_timeout, Timeout::Permanent);
        assert_eq!(fm.hard_timeout, Timeout::Permanent);

        let deletes = path.delete_mods(100);
        assert_eq!(deletes.len(), 3);
        assert!(deletes.iter().all(|(_, fm)| fm.command == FlowModCmd::DeleteStrictFlow));
    }

    #[test]
    fn reversed_path_swaps_ports() {
        let (links, hosts) = maps();
        let path = InstalledPath::resolve(vec![h(11), s(3), s(2), s(1), h(10)], &links, &hosts)
            .unwrap();
        assert_eq!(path.src, MacAddr::new(11));
        assert_eq!(path.hops[1], Hop { device: DeviceId(2), in_port: 2, out_port: 1 });
    }

    #[test]
    fn missing_mappings_are_errors() {
        let (links, hosts) = maps();
        assert_eq!(resolve_hops(&[h(10), s(1), s(4), h(11)], &links, &hosts),
                   Err(PathError::UnknownLink(DeviceId(1), DeviceId(4))));
        assert_eq!(resolve_hops(&[h(12), s(1), s(2), h(11)], &links, &hosts),
                   Err(PathError::UnknownHostPort(MacAddr::new(12), DeviceId(1))));
        assert!(endpoints(&[h(10), s(1)]).is_err());
        assert!(endpoints(&[s(1), s(2), h(10)]).is_err());
    }

    #[test]
    fn cache_inserts_once_and_invalidates_by_edge() {
        let (links, hosts) = maps();
        let mut cache = PathCache::new();
        let nodes = vec![h(10), s(1), s(2), s(3), h(11)];
        let path = InstalledPath::resolve(nodes.clone(), &links, &hosts).unwrap();
        assert!(cache.insert(path.clone()));
        assert!(!cache.insert(path));
        assert!(cache.contains(MacAddr::new(10), MacAddr::new(11)));
        assert!(!cache.contains(MacAddr::new(11), MacAddr::new(10)));

        assert!(cache.invalidate_edge(&s(1), &s(3)).is_empty());
        let stale = cache.invalidate_edge(&s(3), &s(2));
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].nodes, nodes);
        assert!(cache.is_empty());
    }

    #[test]
    fn cache_invalidates_by_switch() {
        let (links, hosts) = maps();
        let mut cache = PathCache::new();
        let path = InstalledPath::resolve(vec![h(10), s(1), s(2), s(3), h(11)], &links, &hosts)
            .unwrap();
        cache.insert(path);
        assert!(cache.invalidate_node(&s(4)).is_empty());
        assert_eq!(cache.invalidate_node(&s(2)).len(), 1);
        assert!(cache.is_empty());
    }
}
