//! Consistent Hash Ring Module
//!
//! Maps string keys to the alive member that owns them. Each server
//! contributes a fixed number of replica points on a 32-bit ring, so load
//! spreads evenly and a membership change only reassigns the keys adjacent
//! to the affected server's points.

pub mod hashring;

pub use hashring::HashRing;
