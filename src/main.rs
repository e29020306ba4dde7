use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use log::info;

use sdn_pathctl::config::ControllerConfig;
use sdn_pathctl::controller::{self, ControllerEvent, ControllerState};
use sdn_pathctl::discovery::{HostEvent, LinkDiscovery, LinkEvent};
use sdn_pathctl::error::ControllerError;
use sdn_pathctl::ofp_controller::{DeviceConnection, DeviceId};
use sdn_pathctl::openflow0x01::message::Message;
use sdn_pathctl::openflow0x01::{PacketIn, PseudoPort};
use sdn_pathctl::packet::{ipv4_frame, MacAddr};

/// Port of every switch facing its host.
const HOST_PORT: u16 = 1;
/// Port of switch `n` facing switch `n + 1`.
const NEXT_PORT: u16 = 2;
/// Port of switch `n` facing switch `n - 1`.
const PREV_PORT: u16 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Shape {
    /// s1 -- s2 -- ... -- sN
    Linear,
    /// s1 -- s2 -- ... -- sN -- s1
    Ring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FloodMode {
    Flood,
    All,
}

/// Drive the controller with a generated topology and two hosts talking across it. Every
/// instruction sent to a switch is logged (set RUST_LOG=info or debug).
#[derive(Debug, Parser)]
struct Cli {
    /// Shape of the switch topology.
    #[clap(long = "topology", short = 't', value_enum, default_value = "ring")]
    topology: Shape,
    /// Number of switches.
    #[clap(long = "switches", short = 's', default_value_t = 4,
           value_parser = clap::value_parser!(u64).range(3..=64))]
    switches: u64,
    /// Pseudo-port used for floods while there is no loop.
    #[clap(long = "flood", value_enum, default_value = "flood")]
    flood: FloodMode,
    /// Statistics polling interval in milliseconds.
    #[clap(long = "stats-interval", default_value_t = 1000)]
    stats_interval_ms: u64,
    /// Number of frames sent in each direction.
    #[clap(long = "frames", short = 'f', default_value_t = 2)]
    frames: u32,
    /// Take the last link down at the end.
    #[clap(long = "cut")]
    cut: bool,
}

/// A switch that only logs what the controller tells it.
struct LoggingConnection {
    id: DeviceId,
    ports: Vec<u16>,
}

impl DeviceConnection for LoggingConnection {
    fn device_id(&self) -> DeviceId {
        self.id
    }

    fn active_ports(&self) -> Vec<u16> {
        self.ports.clone()
    }

    fn send(&self, xid: u32, msg: Message) {
        match msg {
            Message::FlowMod(fm) => {
                info!("[{}] flow mod {:?} prio {} {:?} -> {:?} (idle {:?}, hard {:?})",
                      self.id,
                      fm.command,
                      fm.priority,
                      fm.pattern,
                      fm.actions,
                      fm.idle_timeout,
                      fm.hard_timeout)
            }
            Message::PacketOut(po) => info!("[{}] packet out {:?}", self.id, po.apply_actions),
            Message::StatsRequest(req) => info!("[{}] stats request {:?} (xid {})", self.id, req, xid),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    pretty_env_logger::init_timed();
    let args = Cli::parse();

    let config = ControllerConfig {
        flood_port: match args.flood {
            FloodMode::Flood => PseudoPort::Flood,
            FloodMode::All => PseudoPort::AllPorts,
        },
        stats_interval: Duration::from_millis(args.stats_interval_ms),
        ..ControllerConfig::default()
    };
    let wait = config.stats_interval + Duration::from_millis(100);
    let handle = controller::spawn(ControllerState::new(config, Box::new(LinkDiscovery::new())));

    let n = args.switches;
    for i in 1..=n {
        let conn = LoggingConnection {
            id: DeviceId(i),
            ports: vec![HOST_PORT, NEXT_PORT, PREV_PORT],
        };
        handle.post(ControllerEvent::SwitchConnected(Arc::new(conn)))?;
    }

    let mut links: Vec<LinkEvent> = (1..n)
        .map(|i| LinkEvent::new(DeviceId(i), NEXT_PORT, DeviceId(i + 1), PREV_PORT))
        .collect();
    if args.topology == Shape::Ring {
        links.push(LinkEvent::new(DeviceId(n), NEXT_PORT, DeviceId(1), PREV_PORT));
    }
    for link in &links {
        handle.post(ControllerEvent::LinkUp(*link))?;
        handle.post(ControllerEvent::LinkUp(link.reversed()))?;
    }

    // host a sits on the first switch, host b half way around
    let far = DeviceId(n / 2 + 1);
    let (a, b) = (MacAddr::new(0x0a), MacAddr::new(0x0b));
    let (ip_a, ip_b) = (Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
    handle.post(ControllerEvent::Host(HostEvent { device: DeviceId(1), port: HOST_PORT, mac: a }))?;
    handle.post(ControllerEvent::Host(HostEvent { device: far, port: HOST_PORT, mac: b }))?;

    for _ in 0..args.frames {
        handle.post(ControllerEvent::PacketIn {
            device: DeviceId(1),
            xid: 0,
            packet: PacketIn::unbuffered(HOST_PORT, ipv4_frame(b, a, ip_a, ip_b, 17, &[0; 8])),
        })?;
        handle.post(ControllerEvent::PacketIn {
            device: far,
            xid: 0,
            packet: PacketIn::unbuffered(HOST_PORT, ipv4_frame(a, b, ip_b, ip_a, 17, &[0; 8])),
        })?;
    }

    if args.cut {
        if let Some(last) = links.last() {
            handle.post(ControllerEvent::LinkDown(*last))?;
        }
    }

    tokio::time::sleep(wait).await;
    let state = handle.shutdown().await?;

    info!("broadcast state: {:?}", state.tracker().broadcast_state());
    if let Some(cycle) = state.tracker().loops().cycle() {
        info!("loop: {}",
              cycle.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(" -- "));
    }
    info!("{} path(s) cached, {} forwarding entries, {} -> {} seen {} time(s)",
          state.paths().len(),
          state.table().len(),
          a,
          b,
          state.traffic().count(a, b));
    Ok(())
}
