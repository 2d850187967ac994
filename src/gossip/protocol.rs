//! Gossip Wire Protocol
//!
//! Endpoint paths and Data Transfer Objects for the four protocol messages.
//! Bodies are JSON over HTTP; a [`Change`] travels as
//! `{address, status, incarnationNumber, source?}`.

use serde::{Deserialize, Serialize};

use crate::membership::types::{Change, Member, MemberAddr};

// --- API Endpoints ---

/// Direct health probe, response carries piggybacked changes.
pub const ENDPOINT_PING: &str = "/protocol/ping";
/// Indirect probe: asks the receiver to ping a target on our behalf.
pub const ENDPOINT_PING_REQ: &str = "/protocol/ping-req";
/// Cluster entry point for bootstrapping nodes.
pub const ENDPOINT_JOIN: &str = "/protocol/join";
/// Orderly-departure acknowledgment.
pub const ENDPOINT_LEAVE: &str = "/protocol/leave";

// --- Data Transfer Objects ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingRequest {
    pub source: MemberAddr,
    /// Sender's membership checksum; lets the receiver skip piggyback when
    /// the views already agree.
    pub checksum: u32,
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingReqRequest {
    pub source: MemberAddr,
    /// The member the sender failed to reach directly.
    pub target: MemberAddr,
    pub checksum: u32,
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingReqResponse {
    /// Whether this node could reach the target.
    pub ping_status: bool,
    pub target: MemberAddr,
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub app: String,
    pub source: MemberAddr,
    pub incarnation_number: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub app: String,
    /// The node that served this join.
    pub coordinator: MemberAddr,
    /// Full membership snapshot for the joiner to merge.
    pub membership: Vec<Member>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    pub source: MemberAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveResponse {}

/// Structured rejection body, e.g. `{"type": "invalid-join.app", ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}
