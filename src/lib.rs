//! Application-Layer Sharding Library
//!
//! This library crate defines the core modules of a decentralized sharding
//! system. Every process runs the same protocol: it joins a named cluster,
//! gossips membership, detects failures, and routes keyed requests to the
//! node that owns the key's hash slot.
//!
//! ## Architecture Modules
//! The system is composed of four loosely coupled subsystems:
//!
//! - **`membership`**: The canonical member table and its satellites. Handles
//!   conflict resolution via incarnation numbers, buffers changes for
//!   infection-style dissemination, and runs the suspicion timers that turn
//!   unresponsive peers faulty.
//! - **`gossip`**: The SWIM-style protocol engine. Runs the protocol-period
//!   loop (ping, then indirect ping-req fallback), serves inbound protocol
//!   requests, and bootstraps new nodes into the cluster.
//! - **`ring`**: The consistent hash ring. Maps string keys to the owning
//!   member with bounded reshuffling as nodes come and go.
//! - **`node`**: The facade tying it all together. Exposes `lookup`,
//!   handle-or-proxy routing, lifecycle, events, and stats.

pub mod gossip;
pub mod membership;
pub mod node;
pub mod ring;
