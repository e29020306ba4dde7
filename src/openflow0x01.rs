//! OpenFlow 1.0 instructions exchanged with switches.
//!
//! Encoding these onto the control channel is the job of the device connection; the controller
//! core only builds and inspects them.

use crate::ofp_controller::DeviceId;
use crate::packet::MacAddr;

/// Maximum number of a physical switch port. Everything above is a reserved pseudo-port.
pub const OFPP_MAX: u16 = 0xff00;

/// Fields to match against flows. `None` is a wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pattern {
    pub in_port: Option<u16>,
    pub dl_src: Option<MacAddr>,
    pub dl_dst: Option<MacAddr>,
    pub dl_typ: Option<u16>,
    pub dl_vlan: Option<u16>,
}

impl Pattern {
    /// Match frames from `src` to `dst`, on any port.
    pub fn between(src: MacAddr, dst: MacAddr) -> Pattern {
        Pattern {
            dl_src: Some(src),
            dl_dst: Some(dst),
            ..Pattern::default()
        }
    }
}

/// Port behavior.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PseudoPort {
    PhysicalPort(u16),
    InPort,
    Table,
    Normal,
    Flood,
    AllPorts,
    Controller(u64),
    Local,
}

#[repr(u16)]
enum OfpPort {
    OFPPInPort = 0xfff8,
    OFPPTable = 0xfff9,
    OFPPNormal = 0xfffa,
    OFPPFlood = 0xfffb,
    OFPPAll = 0xfffc,
    OFPPController = 0xfffd,
    OFPPLocal = 0xfffe,
    OFPPNone = 0xffff,
}

impl PseudoPort {
    /// Interpret a port number as sent by a switch. `OFPP_NONE` and numbers in the unassigned
    /// range between `OFPP_MAX` and the reserved ports yield `None`.
    pub fn of_int(p: u16) -> Option<PseudoPort> {
        match p {
            p if p == (OfpPort::OFPPNone as u16) => None,
            p if p == (OfpPort::OFPPInPort as u16) => Some(PseudoPort::InPort),
            p if p == (OfpPort::OFPPTable as u16) => Some(PseudoPort::Table),
            p if p == (OfpPort::OFPPNormal as u16) => Some(PseudoPort::Normal),
            p if p == (OfpPort::OFPPFlood as u16) => Some(PseudoPort::Flood),
            p if p == (OfpPort::OFPPAll as u16) => Some(PseudoPort::AllPorts),
            p if p == (OfpPort::OFPPController as u16) => Some(PseudoPort::Controller(0)),
            p if p == (OfpPort::OFPPLocal as u16) => Some(PseudoPort::Local),
            p if p <= OFPP_MAX => Some(PseudoPort::PhysicalPort(p)),
            _ => None,
        }
    }

    /// Port number of this pseudo-port on the wire.
    pub fn to_int(&self) -> u16 {
        match *self {
            PseudoPort::PhysicalPort(p) => p,
            PseudoPort::InPort => OfpPort::OFPPInPort as u16,
            PseudoPort::Table => OfpPort::OFPPTable as u16,
            PseudoPort::Normal => OfpPort::OFPPNormal as u16,
            PseudoPort::Flood => OfpPort::OFPPFlood as u16,
            PseudoPort::AllPorts => OfpPort::OFPPAll as u16,
            PseudoPort::Controller(_) => OfpPort::OFPPController as u16,
            PseudoPort::Local => OfpPort::OFPPLocal as u16,
        }
    }
}

/// Actions associated with flows and packets.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    Output(PseudoPort),
}

/// How long before a flow entry expires.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Timeout {
    Permanent,
    ExpiresAfter(u16),
}

impl Timeout {
    pub fn of_int(tm: u16) -> Timeout {
        match tm {
            0 => Timeout::Permanent,
            d => Timeout::ExpiresAfter(d),
        }
    }

    pub fn to_int(tm: Timeout) -> u16 {
        match tm {
            Timeout::Permanent => 0,
            Timeout::ExpiresAfter(d) => d,
        }
    }
}

/// Type of modification to perform on a flow table.
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlowModCmd {
    AddFlow,
    ModFlow,
    ModStrictFlow,
    DeleteFlow,
    DeleteStrictFlow,
}

/// Represents modifications to a flow table from the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMod {
    pub command: FlowModCmd,
    pub pattern: Pattern,
    pub priority: u16,
    pub actions: Vec<Action>,
    pub cookie: u64,
    pub idle_timeout: Timeout,
    pub hard_timeout: Timeout,
    pub notify_when_removed: bool,
    pub apply_to_packet: Option<u32>,
    pub out_port: Option<PseudoPort>,
    pub check_overlap: bool,
}

/// The data associated with a packet received by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Buffered(u32, Vec<u8>),
    NotBuffered(Vec<u8>),
}

impl Payload {
    /// The (possibly truncated) frame bytes carried by the payload.
    pub fn bytes(&self) -> &[u8] {
        match *self {
            Payload::Buffered(_, ref buf) |
            Payload::NotBuffered(ref buf) => buf,
        }
    }
}

/// The reason a packet arrives at the controller.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PacketInReason {
    NoMatch,
    ExplicitSend,
}

/// Represents packets received by the datapath and sent to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    pub input_payload: Payload,
    pub total_len: u16,
    pub port: u16,
    pub reason: PacketInReason,
}

impl PacketIn {
    /// A packet-in for an unbuffered frame that missed the flow table.
    pub fn unbuffered(port: u16, frame: Vec<u8>) -> PacketIn {
        PacketIn {
            total_len: frame.len() as u16,
            input_payload: Payload::NotBuffered(frame),
            port,
            reason: PacketInReason::NoMatch,
        }
    }
}

/// Send a packet out of the datapath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOut {
    pub output_payload: Payload,
    pub port_id: Option<u16>,
    pub apply_actions: Vec<Action>,
}

/// Statistics the controller asks a switch for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StatsReq {
    /// Counters of one port, or all ports on `None`.
    Port(Option<u16>),
    /// Counters of one queue on one port, `None` meaning all.
    Queue { port: Option<u16>, queue_id: Option<u32> },
}

/// Counters of one port.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortStatsEntry {
    pub port_no: u16,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
}

/// Port statistics reply of one switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStats {
    pub device: DeviceId,
    pub ports: Vec<PortStatsEntry>,
}

/// Counters of one queue.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueStatsEntry {
    pub port_no: u16,
    pub queue_id: u32,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
}

/// Queue statistics reply of one switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub device: DeviceId,
    pub queues: Vec<QueueStatsEntry>,
}

/// Encapsulates the messages the controller sends to switches.
pub mod message {
    use super::*;

    /// Abstractions of OpenFlow messages sent from the controller to a datapath.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Message {
        FlowMod(FlowMod),
        PacketOut(PacketOut),
        StatsRequest(StatsReq),
    }

    /// Return a `FlowMod` adding a flow parameterized by the given `priority`, `pattern`,
    /// and `actions`.
    pub fn add_flow(prio: u16, pattern: Pattern, actions: Vec<Action>) -> FlowMod {
        FlowMod {
            command: FlowModCmd::AddFlow,
            pattern,
            priority: prio,
            actions,
            cookie: 0,
            idle_timeout: Timeout::Permanent,
            hard_timeout: Timeout::Permanent,
            notify_when_removed: false,
            out_port: None,
            apply_to_packet: None,
            check_overlap: false,
        }
    }

    /// Return a `FlowMod` removing exactly the flow with the given `priority` and `pattern`.
    pub fn delete_flow_strict(prio: u16, pattern: Pattern) -> FlowMod {
        FlowMod {
            command: FlowModCmd::DeleteStrictFlow,
            actions: vec![],
            ..add_flow(prio, pattern, vec![])
        }
    }

    /// Return a `PacketOut` sending `payload`, received on `in_port`, through every port in
    /// `ports`.
    pub fn packet_out(payload: Payload, in_port: u16, ports: Vec<PseudoPort>) -> PacketOut {
        PacketOut {
            output_payload: payload,
            port_id: Some(in_port),
            apply_actions: ports.into_iter().map(Action::Output).collect(),
        }
    }
}
