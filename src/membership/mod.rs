//! Membership & Conflict Resolution Module
//!
//! Maintains the canonical view of every node known to the cluster and
//! reconciles the conflicting reports that gossip inevitably produces.
//!
//! ## Core Mechanisms
//! - **Incarnation Numbers**: Each member owns a monotonically increasing
//!   version of its own state. A report only wins against a newer incarnation
//!   if it carries a higher-precedence status, and a node can always refute
//!   false rumors about itself by re-announcing at a bumped incarnation.
//! - **Infection-Style Dissemination**: Accepted changes enter a piggyback
//!   buffer and ride on every outgoing protocol message a bounded number of
//!   times, scaled with cluster size for high-probability full coverage.
//! - **Suspicion Timers**: A peer marked `suspect` gets a grace window to
//!   refute before it is declared `faulty` and drops out of the ring.

pub mod dissemination;
pub mod suspicion;
pub mod table;
pub mod types;

#[cfg(test)]
mod tests;
