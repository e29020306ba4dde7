//! The controller application: one owned state value driven by a single task.
//!
//! Every frame that reaches the controller is learned from, then either flooded (restricted to
//! the spanning tree while the topology has a loop) or answered with a pair of point-to-point
//! rules on the ingress switch. While a loop exists, frames between two known hosts additionally
//! trigger installation of explicit rules along the weighted shortest path between them, once
//! per direction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::ControllerConfig;
use crate::discovery::{Discovery, HostEvent, LinkEvent};
use crate::error::{ControllerError, PathError};
use crate::forwarding::{ForwardingTable, IpMacTable, TrafficCounter};
use crate::loop_guard::BroadcastState;
use crate::ofp_controller::{DeviceConnection, DeviceId, OfpController};
use crate::openflow0x01::message::{add_flow, packet_out, Message};
use crate::openflow0x01::{Action, PacketIn, Pattern, PortStats, PseudoPort, QueueStats};
use crate::packet::{MacAddr, Nw, Packet};
use crate::path::{endpoints, InstalledPath, PathCache};
use crate::stats::{poll_requests, BandwidthMonitor};
use crate::topology::{EdgeUpdate, NodeId};
use crate::tracker::TopologyTracker;

pub struct ControllerState {
    config: ControllerConfig,
    connections: HashMap<DeviceId, Arc<dyn DeviceConnection>>,
    tracker: TopologyTracker,
    table: ForwardingTable,
    traffic: TrafficCounter,
    ip_to_mac: IpMacTable,
    paths: PathCache,
    bandwidth: BandwidthMonitor,
}

impl ControllerState {
    pub fn new(config: ControllerConfig, discovery: Box<dyn Discovery>) -> ControllerState {
        ControllerState {
            tracker: TopologyTracker::new(discovery,
                                          config.switch_link_weight,
                                          config.host_link_weight),
            bandwidth: BandwidthMonitor::new(config.stats_interval),
            connections: HashMap::new(),
            table: ForwardingTable::new(),
            traffic: TrafficCounter::new(),
            ip_to_mac: IpMacTable::default(),
            paths: PathCache::new(),
            config,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn tracker(&self) -> &TopologyTracker {
        &self.tracker
    }

    pub fn table(&self) -> &ForwardingTable {
        &self.table
    }

    pub fn traffic(&self) -> &TrafficCounter {
        &self.traffic
    }

    pub fn ip_to_mac(&self) -> &IpMacTable {
        &self.ip_to_mac
    }

    pub fn paths(&self) -> &PathCache {
        &self.paths
    }

    pub fn is_connected(&self, sw: DeviceId) -> bool {
        self.connections.contains_key(&sw)
    }

    /// Apply one event.
    pub fn handle(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::SwitchConnected(conn) => self.switch_connected(conn),
            ControllerEvent::SwitchDisconnected(sw) => self.switch_disconnected(sw),
            ControllerEvent::PacketIn { device, xid, packet } => self.packet_in(device, xid, packet),
            ControllerEvent::LinkUp(link) => self.link_up(link),
            ControllerEvent::LinkDown(link) => self.link_down(link),
            ControllerEvent::Host(host) => self.host_event(host),
            ControllerEvent::PortStats(stats) => self.port_stats(stats),
            ControllerEvent::QueueStats(stats) => self.queue_stats(stats),
            ControllerEvent::PollStats => self.poll_stats(),
        }
    }

    /// Ask every connected switch for its port and queue counters.
    pub fn poll_stats(&self) {
        trace!("polling statistics of {} switch(es)", self.connections.len());
        for conn in self.connections.values() {
            for req in poll_requests().iter() {
                conn.send(0, Message::StatsRequest(*req));
            }
        }
    }

    /// Install `src <-> dst` rules on the ingress switch and send the frame on to `dst_port`.
    /// Each rule expires after the traffic count of its own direction.
    fn install_point_to_point(&self,
                              conn: &dyn DeviceConnection,
                              xid: u32,
                              pkt: PacketIn,
                              frame: &Packet,
                              dst_port: u16) {
        let (src, dst) = (frame.dl_src, frame.dl_dst);
        let prio = self.config.learned_priority;

        let (idle, hard) = self.traffic.timeouts(dst, src);
        let mut dst_src = add_flow(prio,
                                   Pattern::between(dst, src),
                                   vec![Action::Output(PseudoPort::PhysicalPort(pkt.port))]);
        dst_src.idle_timeout = idle;
        dst_src.hard_timeout = hard;
        debug!("Installing rule for host {} to {} on {}.", dst, src, conn.device_id());
        conn.send(xid, Message::FlowMod(dst_src));

        let (idle, hard) = self.traffic.timeouts(src, dst);
        let mut src_dst = add_flow(prio,
                                   Pattern::between(src, dst),
                                   vec![Action::Output(PseudoPort::PhysicalPort(dst_port))]);
        src_dst.idle_timeout = idle;
        src_dst.hard_timeout = hard;
        debug!("Installing rule for host {} to {} on {}.", src, dst, conn.device_id());
        conn.send(xid, Message::FlowMod(src_dst));

        let out = packet_out(pkt.input_payload,
                             pkt.port,
                             vec![PseudoPort::PhysicalPort(dst_port)]);
        conn.send(xid, Message::PacketOut(out));
    }

    /// Program the shortest path between two hosts in both directions, unless it stays within a
    /// single switch.
    fn program_shortest_path(&mut self, src: MacAddr, dst: MacAddr) {
        let nodes = match self.tracker
            .topology()
            .shortest_path(&NodeId::Host(src), &NodeId::Host(dst)) {
            Ok(nodes) => nodes,
            Err(e) => {
                debug!("No path programmed for {} -> {}: {}", src, dst, e);
                return;
            }
        };
        if nodes.len() <= 2 {
            return;
        }
        let mut reversed = nodes.clone();
        reversed.reverse();
        self.install_path(nodes);
        self.install_path(reversed);
    }

    /// Send the rules of a host-to-host path to its switches and cache it. Nothing is sent when
    /// the pair is cached already or when any hop cannot be resolved. Returns whether the path
    /// was installed.
    fn install_path(&mut self, nodes: Vec<NodeId>) -> bool {
        let (src, dst) = match endpoints(&nodes) {
            Ok(pair) => pair,
            Err(e) => {
                debug!("{}", e);
                return false;
            }
        };
        if self.paths.contains(src, dst) {
            trace!("path {} -> {} already installed", src, dst);
            return false;
        }
        let path = match InstalledPath::resolve(nodes, self.tracker.links(), self.tracker.hosts()) {
            Ok(path) => path,
            Err(e) => {
                warn!("Not installing path {} -> {}: {}", src, dst, e);
                return false;
            }
        };
        let targets: Result<Vec<_>, PathError> = path.flow_mods(self.config.path_priority)
            .into_iter()
            .map(|(sw, fm)| {
                self.connections
                    .get(&sw)
                    .map(|conn| (Arc::clone(conn), fm))
                    .ok_or(PathError::NotConnected(sw))
            })
            .collect();
        let targets = match targets {
            Ok(targets) => targets,
            Err(e) => {
                warn!("Not installing path {} -> {}: {}", src, dst, e);
                return false;
            }
        };
        info!("Installing path {} -> {}: {}",
              src,
              dst,
              path.nodes.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(" > "));
        for (conn, fm) in targets {
            conn.send(0, Message::FlowMod(fm));
        }
        self.paths.insert(path)
    }

    /// Forget cached paths over `a -- b` and remove their rules from the switches.
    fn invalidate_edge(&mut self, a: NodeId, b: NodeId) {
        for path in self.paths.invalidate_edge(&a, &b) {
            info!("Path {} -> {} crosses {} -- {}, removing its rules.",
                  path.src,
                  path.dst,
                  a,
                  b);
            self.remove_rules(&path);
        }
    }

    /// Strict-delete the rules of `path` on every switch that is still connected.
    fn remove_rules(&self, path: &InstalledPath) {
        for (sw, fm) in path.delete_mods(self.config.path_priority) {
            if let Some(conn) = self.connections.get(&sw) {
                conn.send(0, Message::FlowMod(fm));
            }
        }
    }
}

impl OfpController for ControllerState {
    fn switch_connected(&mut self, conn: Arc<dyn DeviceConnection>) {
        let sw = conn.device_id();
        info!("Switch {} connected with ports {:?}.", sw, conn.active_ports());
        self.tracker.switch_up(sw);
        self.connections.insert(sw, conn);
    }

    fn switch_disconnected(&mut self, sw: DeviceId) {
        info!("Switch {} disconnected.", sw);
        self.connections.remove(&sw);
        self.bandwidth.forget(sw);
        for path in self.paths.invalidate_node(&NodeId::Switch(sw)) {
            info!("Path {} -> {} runs through {}, removing its rules.", path.src, path.dst, sw);
            self.remove_rules(&path);
        }
    }

    fn packet_in(&mut self, sw: DeviceId, xid: u32, pkt: PacketIn) {
        let conn = match self.connections.get(&sw) {
            Some(conn) => Arc::clone(conn),
            None => {
                warn!("Ignoring packet from unconnected switch {}", sw);
                return;
            }
        };
        let frame = match Packet::parse(pkt.input_payload.bytes()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Ignoring incomplete packet on {}:{}: {}", sw, pkt.port, e);
                return;
            }
        };
        self.table.learn(sw, frame.dl_src, pkt.port);

        if frame.is_ipv6() {
            let drop = packet_out(pkt.input_payload, pkt.port, vec![]);
            conn.send(xid, Message::PacketOut(drop));
            return;
        }
        if !frame.is_complete() {
            warn!("Ignoring incomplete packet on {}:{}", sw, pkt.port);
            return;
        }
        if let Nw::Ip(ref ip) = frame.nw {
            self.ip_to_mac.insert(ip.src, frame.dl_src);
            self.ip_to_mac.insert(ip.dst, frame.dl_dst);
            self.traffic.record(frame.dl_src, frame.dl_dst);
        }
        let dst_port = self.table.lookup(sw, frame.dl_dst);

        match self.tracker.broadcast_state() {
            BroadcastState::LoopDetected => {
                self.program_shortest_path(frame.dl_src, frame.dl_dst);
                match dst_port {
                    Some(p) => self.install_point_to_point(conn.as_ref(), xid, pkt, &frame, p),
                    None => {
                        let ports = self.tracker.loops().flood_ports(sw,
                                                                     &conn.active_ports(),
                                                                     self.tracker.discovery());
                        debug!("Flooding to {} along the spanning tree: {:?}", frame.dl_dst, ports);
                        let out = packet_out(pkt.input_payload, pkt.port, ports);
                        conn.send(xid, Message::PacketOut(out));
                    }
                }
            }
            BroadcastState::Normal => {
                match dst_port {
                    Some(p) => self.install_point_to_point(conn.as_ref(), xid, pkt, &frame, p),
                    None => {
                        debug!("Flooding to {}", frame.dl_dst);
                        let out = packet_out(pkt.input_payload, pkt.port, vec![self.config.flood_port]);
                        conn.send(xid, Message::PacketOut(out));
                    }
                }
            }
        }
    }

    fn link_up(&mut self, link: LinkEvent) {
        if link.a == link.b {
            warn!("Ignoring link from {} to itself", link.a);
            return;
        }
        let change = self.tracker.link_up(&link);
        if change.edge == EdgeUpdate::Reweighted {
            self.invalidate_edge(NodeId::Switch(link.a), NodeId::Switch(link.b));
        }
    }

    fn link_down(&mut self, link: LinkEvent) {
        if self.tracker.link_down(&link) {
            self.invalidate_edge(NodeId::Switch(link.a), NodeId::Switch(link.b));
        }
    }

    fn host_event(&mut self, host: HostEvent) {
        if let Some((sw, _)) = self.tracker.host_up(&host) {
            self.invalidate_edge(NodeId::Switch(sw), NodeId::Host(host.mac));
        }
    }

    fn port_stats(&mut self, stats: PortStats) {
        for sample in self.bandwidth.observe(&stats) {
            info!("{} port {}: {:.2} Mbit/s", sample.device, sample.port, sample.mbps);
        }
    }

    fn queue_stats(&mut self, stats: QueueStats) {
        debug!("Queue stats from {}: {:?}", stats.device, stats.queues);
    }
}

/// Inputs of the controller task.
pub enum ControllerEvent {
    SwitchConnected(Arc<dyn DeviceConnection>),
    SwitchDisconnected(DeviceId),
    PacketIn {
        device: DeviceId,
        xid: u32,
        packet: PacketIn,
    },
    LinkUp(LinkEvent),
    LinkDown(LinkEvent),
    Host(HostEvent),
    PortStats(PortStats),
    QueueStats(QueueStats),
    /// Send statistics requests to every switch.
    PollStats,
}

enum Command {
    Event(ControllerEvent),
    Shutdown(oneshot::Sender<ControllerState>),
}

/// Cloneable sender of events to a running controller task.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl ControllerHandle {
    /// Queue `event` for the controller. Never waits for it to be processed.
    pub fn post(&self, event: ControllerEvent) -> Result<(), ControllerError> {
        self.tx.send(Command::Event(event)).map_err(|_| ControllerError::Stopped)
    }

    /// Stop the controller after every event queued before this call was applied, and return
    /// its state.
    pub async fn shutdown(self) -> Result<ControllerState, ControllerError> {
        let (reply, state) = oneshot::channel();
        self.tx.send(Command::Shutdown(reply)).map_err(|_| ControllerError::Stopped)?;
        state.await.map_err(|_| ControllerError::Stopped)
    }
}

/// Move `state` into a task that applies events in arrival order and polls statistics every
/// `stats_interval`. The task ends on `shutdown` or once every handle is dropped. Must be called
/// from within a tokio runtime.
pub fn spawn(state: ControllerState) -> ControllerHandle {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let period = state.config.stats_interval.max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut state = state;
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                cmd = rx.recv() => match cmd {
                    Some(Command::Event(event)) => state.handle(event),
                    Some(Command::Shutdown(reply)) => {
                        info!("Controller stopping.");
                        let _ = reply.send(state);
                        return;
                    }
                    None => {
                        info!("All controller handles dropped, stopping.");
                        return;
                    }
                },
                _ = timer.tick() => state.poll_stats(),
            }
        }
    });

    ControllerHandle { tx }
}
