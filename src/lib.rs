#![crate_name = "sdn_pathctl"]
#![crate_type = "lib"]

//! Control logic of a loop-aware OpenFlow 1.0 controller.
//!
//! The controller keeps a weighted graph of switches and hosts built from link- and
//! host-discovery events. Frames sent to the controller are handled like a learning switch
//! would, except that floods are confined to a spanning tree whenever the topology has a cycle,
//! and that explicit rules are programmed along shortest paths between known hosts.

pub mod config;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod forwarding;
pub mod loop_guard;
pub mod ofp_controller;
pub mod openflow0x01;
pub mod packet;
pub mod path;
pub mod stats;
pub mod topology;
pub mod tracker;
