//! SWIM Protocol Module
//!
//! Implements the failure-detection and dissemination protocol the cluster
//! runs between nodes.
//!
//! ## Core Mechanisms
//! - **Protocol Periods**: A cooperative loop pings one member per period,
//!   falling back to indirect `ping-req` probes through `ping_req_size`
//!   helpers before suspecting the target. Period length adapts to observed
//!   round-trip times with a configured floor.
//! - **Piggybacked Gossip**: Every request and response carries a bounded
//!   batch of recent membership changes, so dissemination free-rides on the
//!   failure-detection traffic.
//! - **Bootstrap**: A joining node fans `join` requests out to seed hosts
//!   until enough coordinators accept, then merges their membership views.

pub mod client;
pub mod handlers;
pub mod join;
pub mod protocol;
pub mod service;

pub use service::{GossipService, NodeEvent};
