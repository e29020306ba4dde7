//! Learned MAC locations and per-flow traffic counters.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::ofp_controller::DeviceId;
use crate::openflow0x01::Timeout;
use crate::packet::MacAddr;

/// Maps `(switch, MAC)` to the port on that switch where the MAC was last seen as a source.
#[derive(Debug, Clone, Default)]
pub struct ForwardingTable {
    known_hosts: HashMap<(DeviceId, MacAddr), u16>,
}

impl ForwardingTable {
    pub fn new() -> ForwardingTable {
        ForwardingTable::default()
    }

    /// Remember that `src` sits behind `in_port` of `sw`, replacing any earlier entry.
    pub fn learn(&mut self, sw: DeviceId, src: MacAddr, in_port: u16) {
        self.known_hosts.insert((sw, src), in_port);
    }

    pub fn lookup(&self, sw: DeviceId, dst: MacAddr) -> Option<u16> {
        self.known_hosts.get(&(sw, dst)).copied()
    }

    pub fn len(&self) -> usize {
        self.known_hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known_hosts.is_empty()
    }
}

/// Number of IPv4 frames seen per ordered `(src, dst)` pair.
#[derive(Debug, Clone, Default)]
pub struct TrafficCounter {
    pairs: HashMap<(MacAddr, MacAddr), u64>,
}

impl TrafficCounter {
    pub fn new() -> TrafficCounter {
        TrafficCounter::default()
    }

    pub fn record(&mut self, src: MacAddr, dst: MacAddr) -> u64 {
        let count = self.pairs.entry((src, dst)).or_insert(0);
        *count += 1;
        *count
    }

    pub fn count(&self, src: MacAddr, dst: MacAddr) -> u64 {
        self.pairs.get(&(src, dst)).copied().unwrap_or(0)
    }

    /// Idle and hard timeout of a rule carrying `src -> dst`: the pair's count and twice that,
    /// in seconds. Busy flows keep their rules longer. An unseen pair gets permanent rules.
    pub fn timeouts(&self, src: MacAddr, dst: MacAddr) -> (Timeout, Timeout) {
        let idle = self.count(src, dst).min((u16::MAX / 2) as u64) as u16;
        (Timeout::of_int(idle), Timeout::of_int(idle * 2))
    }
}

/// IPv4 addresses observed in traffic and the MAC that carried them.
#[derive(Debug, Clone, Default)]
pub struct IpMacTable {
    entries: HashMap<Ipv4Addr, MacAddr>,
}

impl IpMacTable {
    pub fn insert(&mut self, ip: Ipv4Addr, mac: MacAddr) {
        self.entries.insert(ip, mac);
    }

    pub fn get(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.entries.get(&ip).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learning_overwrites() {
        let mut table = ForwardingTable::new();
        let mac = MacAddr::new(0x0a);
        assert_eq!(table.lookup(DeviceId(1), mac), None);
        table.learn(DeviceId(1), mac, 3);
        table.learn(DeviceId(1), mac, 3);
        assert_eq!(table.lookup(DeviceId(1), mac), Some(3));
        assert_eq!(table.len(), 1);
        table.learn(DeviceId(1), mac, 4);
        assert_eq!(table.lookup(DeviceId(1), mac), Some(4));
        assert_eq!(table.lookup(DeviceId(2), mac), None);
    }

    #[test]
    fn timeouts_follow_the_ordered_count() {
        let mut counter = TrafficCounter::new();
        let (a, b) = (MacAddr::new(1), MacAddr::new(2));
        assert_eq!(counter.timeouts(a, b), (Timeout::Permanent, Timeout::Permanent));
        counter.record(a, b);
        assert_eq!(counter.timeouts(a, b), (Timeout::ExpiresAfter(1), Timeout::ExpiresAfter(2)));
        assert_eq!(counter.record(a, b), 2);
        assert_eq!(counter.timeouts(a, b), (Timeout::ExpiresAfter(2), Timeout::ExpiresAfter(4)));
        assert_eq!(counter.count(b, a), 0);
    }

    #[test]
    fn timeouts_saturate() {
        let mut counter = TrafficCounter::new();
        let (a, b) = (MacAddr::new(1), MacAddr::new(2));
        counter.pairs.insert((a, b), 1 << 40);
        let (idle, hard) = counter.timeouts(a, b);
        assert_eq!(Timeout::to_int(hard), 2 * Timeout::to_int(idle));
        assert_eq!(Timeout::to_int(idle), u16::MAX / 2);
    }
}
