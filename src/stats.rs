//! Periodic statistics requests and bandwidth estimation from port counters. Nothing here
//! influences forwarding.

use std::collections::HashMap;
use std::time::Duration;

use crate::ofp_controller::DeviceId;
use crate::openflow0x01::{PortStats, StatsReq};

/// Ports numbered at or above `OFPP_LOCAL` are not attached to hosts or other switches.
const OFPP_LOCAL: u16 = 0xfffe;

/// Requests sent to every connected switch on each polling tick.
pub fn poll_requests() -> [StatsReq; 2] {
    [StatsReq::Port(None),
     StatsReq::Queue {
         port: None,
         queue_id: None,
     }]
}

/// Traffic through one port since the previous sample.
#[derive(Debug, Clone, PartialEq)]
pub struct BandwidthSample {
    pub device: DeviceId,
    pub port: u16,
    /// Megabits per second, rounded to two decimals.
    pub mbps: f64,
}

/// Estimates per-port throughput from the byte counters of consecutive port statistics.
#[derive(Debug, Clone)]
pub struct BandwidthMonitor {
    interval: Duration,
    last_bytes: HashMap<DeviceId, HashMap<u16, u64>>,
}

impl BandwidthMonitor {
    /// `interval` is the time between two statistics polls.
    pub fn new(interval: Duration) -> BandwidthMonitor {
        BandwidthMonitor {
            interval,
            last_bytes: HashMap::new(),
        }
    }

    /// Update the counters with a new reply and return the ports that carried traffic.
    pub fn observe(&mut self, stats: &PortStats) -> Vec<BandwidthSample> {
        let secs = self.interval.as_secs_f64().max(f64::EPSILON);
        let last = self.last_bytes.entry(stats.device).or_default();
        let mut samples = vec![];
        for entry in stats.ports.iter().filter(|e| e.port_no < OFPP_LOCAL) {
            let current = entry.rx_bytes + entry.tx_bytes;
            let previous = last.insert(entry.port_no, current).unwrap_or(0);
            let megabits = current.saturating_sub(previous) as f64 / 1024.0 / 1024.0 * 8.0;
            let mbps = (megabits / secs * 100.0).round() / 100.0;
            if mbps > 0.0 {
                samples.push(BandwidthSample {
                    device: stats.device,
                    port: entry.port_no,
                    mbps,
                });
            }
        }
        samples
    }

    /// Drop the counters of a disconnected switch.
    pub fn forget(&mut self, device: DeviceId) {
        self.last_bytes.remove(&device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openflow0x01::PortStatsEntry;

    fn stats(rx: u64, tx: u64) -> PortStats {
        PortStats {
            device: DeviceId(1),
            ports: vec![PortStatsEntry {
                            port_no: 1,
                            rx_bytes: rx,
                            tx_bytes: tx,
                            ..PortStatsEntry::default()
                        },
                        PortStatsEntry {
                            port_no: OFPP_LOCAL,
                            rx_bytes: rx,
                            tx_bytes: tx,
                            ..PortStatsEntry::default()
                        }],
        }
    }

    #[test]
    fn samples_the_delta() {
        let mut monitor = BandwidthMonitor::new(Duration::from_secs(1));
        let first = monitor.observe(&stats(1 << 20, 1 << 20));
        assert_eq!(first,
                   vec![BandwidthSample {
                            device: DeviceId(1),
                            port: 1,
                            mbps: 16.0,
                        }]);
        let second = monitor.observe(&stats(3 << 19, 1 << 20));
        assert_eq!(second[0].mbps, 4.0);
        assert!(monitor.observe(&stats(3 << 19, 1 << 20)).is_empty());

        monitor.forget(DeviceId(1));
        assert_eq!(monitor.observe(&stats(0, 1 << 17))[0].mbps, 1.0);
    }
}
