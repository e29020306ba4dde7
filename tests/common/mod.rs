//! Helpers shared by the integration tests: switches that record what they are told, and a
//! small network builder feeding events straight into a `ControllerState`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use sdn_pathctl::config::ControllerConfig;
use sdn_pathctl::controller::ControllerState;
use sdn_pathctl::discovery::{HostEvent, LinkDiscovery, LinkEvent};
use sdn_pathctl::ofp_controller::{DeviceConnection, DeviceId, OfpController};
use sdn_pathctl::openflow0x01::message::Message;
use sdn_pathctl::openflow0x01::{FlowMod, PacketIn, PacketOut};
use sdn_pathctl::packet::{ethernet_frame, ipv4_frame, MacAddr};

pub struct RecordingConnection {
    id: DeviceId,
    ports: Vec<u16>,
    sent: Mutex<Vec<Message>>,
}

impl RecordingConnection {
    pub fn new(id: u64, ports: &[u16]) -> Arc<RecordingConnection> {
        Arc::new(RecordingConnection {
            id: DeviceId(id),
            ports: ports.to_vec(),
            sent: Mutex::new(vec![]),
        })
    }

    /// Messages sent since the last call.
    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn flow_mods(msgs: &[Message]) -> Vec<FlowMod> {
        msgs.iter()
            .filter_map(|m| match m {
                Message::FlowMod(fm) => Some(fm.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn packet_outs(msgs: &[Message]) -> Vec<PacketOut> {
        msgs.iter()
            .filter_map(|m| match m {
                Message::PacketOut(po) => Some(po.clone()),
                _ => None,
            })
            .collect()
    }
}

impl DeviceConnection for RecordingConnection {
    fn device_id(&self) -> DeviceId {
        self.id
    }

    fn active_ports(&self) -> Vec<u16> {
        self.ports.clone()
    }

    fn send(&self, _xid: u32, msg: Message) {
        self.sent.lock().unwrap().push(msg);
    }
}

pub fn mac(n: u64) -> MacAddr {
    MacAddr::new(n)
}

pub fn ip_of(m: MacAddr) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, m.to_int() as u8)
}

/// IPv4 frame from `src` to `dst`.
pub fn ipv4(src: MacAddr, dst: MacAddr) -> Vec<u8> {
    ipv4_frame(dst, src, ip_of(src), ip_of(dst), 17, &[0; 8])
}

/// ARP query from `src`, addressed to `dst`.
pub fn arp(src: MacAddr, dst: MacAddr) -> Vec<u8> {
    let mut body = vec![0, 1, 0x08, 0x00, 6, 4, 0, 1];
    body.extend_from_slice(&src.bytes());
    body.extend_from_slice(&ip_of(src).octets());
    body.extend_from_slice(&[0; 6]);
    body.extend_from_slice(&ip_of(dst).octets());
    ethernet_frame(dst, src, 0x0806, &body)
}

pub struct Net {
    pub state: ControllerState,
    pub switches: HashMap<u64, Arc<RecordingConnection>>,
}

impl Net {
    pub fn new() -> Net {
        Net::with_config(ControllerConfig::default())
    }

    pub fn with_config(config: ControllerConfig) -> Net {
        Net {
            state: ControllerState::new(config, Box::new(LinkDiscovery::new())),
            switches: HashMap::new(),
        }
    }

    /// Connect switch `n` with the given ports.
    pub fn switch(&mut self, n: u64, ports: &[u16]) -> Arc<RecordingConnection> {
        let conn = RecordingConnection::new(n, ports);
        self.state.switch_connected(conn.clone());
        self.switches.insert(n, conn.clone());
        conn
    }

    /// Report the link `a:pa -- b:pb` from both ends, the way link discovery does.
    pub fn link(&mut self, a: u64, pa: u16, b: u64, pb: u16) {
        let link = LinkEvent::new(DeviceId(a), pa, DeviceId(b), pb);
        self.state.link_up(link);
        self.state.link_up(link.reversed());
    }

    pub fn host(&mut self, sw: u64, port: u16, m: MacAddr) {
        self.state.host_event(HostEvent {
            device: DeviceId(sw),
            port,
            mac: m,
        });
    }

    /// Deliver `frame` as a packet-in from `sw:port`.
    pub fn frame(&mut self, sw: u64, port: u16, frame: Vec<u8>) {
        self.state.packet_in(DeviceId(sw), 0, PacketIn::unbuffered(port, frame));
    }

    /// Messages sent to switch `n` since the last call.
    pub fn sent(&self, n: u64) -> Vec<Message> {
        self.switches[&n].take()
    }

    /// Forget everything sent so far.
    pub fn clear(&self) {
        for conn in self.switches.values() {
            conn.take();
        }
    }

    /// Ring of `n` switches. Every switch uses port 1 for its host, port 2 towards the next
    /// switch and port 3 towards the previous one.
    pub fn ring(n: u64) -> Net {
        let mut net = Net::new();
        for i in 1..=n {
            net.switch(i, &[1, 2, 3]);
        }
        for i in 1..=n {
            net.link(i, 2, i % n + 1, 3);
        }
        net
    }

    /// Line of `n` switches with the port layout of `ring`.
    pub fn line(n: u64) -> Net {
        let mut net = Net::new();
        for i in 1..=n {
            net.switch(i, &[1, 2, 3]);
        }
        for i in 1..n {
            net.link(i, 2, i + 1, 3);
        }
        net
    }
}
