//! Error types of the controller core.

use std::io;

use thiserror::Error;

use crate::ofp_controller::DeviceId;
use crate::packet::MacAddr;
use crate::topology::NodeId;

/// Errors raised while parsing a frame received in a packet-in.
#[derive(Error, Debug)]
pub enum PacketError {
    /// The frame is shorter than the header of the given layer.
    #[error("frame too short for the {layer} header: {len} bytes")]
    Truncated { layer: &'static str, len: usize },
    /// A read ran past the end of the buffer.
    #[error("unexpected end of frame: {0}")]
    UnexpectedEof(#[from] io::Error),
    /// A textual MAC address could not be parsed.
    #[error("invalid MAC address: {0:?}")]
    InvalidMac(String),
}

/// Errors of queries against the topology graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// The node was never added to the graph.
    #[error("node {0} is not part of the topology")]
    NodeNotFound(NodeId),
    /// Both nodes are known, but they are not connected.
    #[error("no path from {0} to {1}")]
    NoPath(NodeId, NodeId),
}

/// Errors while translating a path into per-switch forwarding rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The path does not start and end at a host.
    #[error("path does not connect two hosts: {0:?}")]
    NotHostToHost(Vec<NodeId>),
    /// The location of the host on the neighbouring switch is unknown.
    #[error("host {0} is not known to be attached to {1}")]
    UnknownHostPort(MacAddr, DeviceId),
    /// No link was observed between the two switches.
    #[error("no port mapping for the link {0} -- {1}")]
    UnknownLink(DeviceId, DeviceId),
    /// A switch on the path has no open connection.
    #[error("switch {0} is not connected")]
    NotConnected(DeviceId),
}

/// Errors of the controller task handle.
#[derive(Error, Debug)]
pub enum ControllerError {
    /// The controller task has stopped and no longer accepts events.
    #[error("controller task has stopped")]
    Stopped,
}
