use std::time::Duration;

use crate::openflow0x01::PseudoPort;
use crate::topology::LinkWeight;

/// Tunables of the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Weight of a switch-to-switch edge.
    pub switch_link_weight: LinkWeight,
    /// Weight of a switch-to-host edge.
    pub host_link_weight: LinkWeight,
    /// Priority of rules installed along computed paths.
    pub path_priority: u16,
    /// Priority of the point-to-point rules installed on the ingress switch.
    pub learned_priority: u16,
    /// Pseudo-port used to flood while the topology has no loop. `Flood` honours the switch's
    /// no-flood port configuration, `AllPorts` does not.
    pub flood_port: PseudoPort,
    /// Time between two statistics polls.
    pub stats_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> ControllerConfig {
        ControllerConfig {
            switch_link_weight: 100,
            host_link_weight: 10,
            path_priority: 100,
            learned_priority: 1,
            flood_port: PseudoPort::Flood,
            stats_interval: Duration::from_secs(1),
        }
    }
}
