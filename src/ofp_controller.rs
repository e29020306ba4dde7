use std::fmt;
use std::sync::Arc;

use crate::discovery::{HostEvent, LinkEvent};
use crate::openflow0x01::message::Message;
use crate::openflow0x01::{PacketIn, PortStats, QueueStats};

/// Datapath identifier of a switch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    /// Dash separated hex octets of the lower 48 bits, with the upper 16 bits appended as
    /// `|n` when set.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let octets: Vec<String> = (0..6)
            .rev()
            .map(|i| format!("{:02x}", (self.0 >> (8 * i)) & 0xff))
            .collect();
        f.write_str(&octets.join("-"))?;
        match self.0 >> 48 {
            0 => Ok(()),
            extra => write!(f, "|{}", extra),
        }
    }
}

impl From<u64> for DeviceId {
    fn from(dpid: u64) -> DeviceId {
        DeviceId(dpid)
    }
}

/// An open control channel to one switch.
///
/// Sending is one-way: the controller never waits for the switch to act on a message.
pub trait DeviceConnection: Send + Sync {
    /// Datapath id of the switch behind this connection.
    fn device_id(&self) -> DeviceId;
    /// Port numbers currently present on the switch.
    fn active_ports(&self) -> Vec<u16>;
    /// Send a message to the switch with transaction id `xid`.
    fn send(&self, xid: u32, msg: Message);
}

/// OpenFlow Controller
///
/// Events an OpenFlow application reacts to. Implementors are driven sequentially by a single
/// owner.
pub trait OfpController {
    /// A switch completed its handshake.
    fn switch_connected(&mut self, conn: Arc<dyn DeviceConnection>);
    /// The control channel to a switch closed.
    fn switch_disconnected(&mut self, sw: DeviceId);
    /// A switch forwarded a frame to the controller.
    fn packet_in(&mut self, sw: DeviceId, xid: u32, pkt: PacketIn);
    /// Link discovery saw a new switch-to-switch link.
    fn link_up(&mut self, link: LinkEvent);
    /// Link discovery lost a switch-to-switch link.
    fn link_down(&mut self, link: LinkEvent);
    /// Host tracking located a host.
    fn host_event(&mut self, host: HostEvent);
    /// A switch answered a port statistics request.
    fn port_stats(&mut self, stats: PortStats);
    /// A switch answered a queue statistics request.
    fn queue_stats(&mut self, stats: QueueStats);
}

#[cfg(test)]
mod tests {
    use super::DeviceId;

    #[test]
    fn dpid_rendering() {
        assert_eq!(DeviceId(1).to_string(), "00-00-00-00-00-01");
        assert_eq!(DeviceId(0x0a0b_0c0d_0e0f).to_string(), "0a-0b-0c-0d-0e-0f");
        assert_eq!(DeviceId((3 << 48) | 2).to_string(), "00-00-00-00-00-02|3");
    }
}
