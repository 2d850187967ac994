//! Node Facade Module
//!
//! The outward face of the library: configuration, typed errors, stats,
//! request forwarding, and the [`service::Node`] facade that ties the gossip
//! engine and the hash ring into a single lifecycle.

pub mod config;
pub mod errors;
pub mod proxy;
pub mod service;
pub mod stats;

pub use config::Config;
pub use errors::{JoinError, NodeError};
pub use service::{Node, Routed};

#[cfg(test)]
mod tests;
