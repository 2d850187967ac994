use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Cluster-unique identifier of a member, in `host:port` form.
///
/// The address doubles as the primary key of the member table and as the
/// server identity on the hash ring. Two processes must never share one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberAddr(pub String);

/// Address family of the host part, used for the seed-list kinship check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrFamily {
    Ip,
    Hostname,
}

impl MemberAddr {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Host portion, without the port.
    pub fn host(&self) -> &str {
        self.0.rsplit_once(':').map(|(h, _)| h).unwrap_or(&self.0)
    }

    /// Port portion, if present and numeric.
    pub fn port(&self) -> Option<u16> {
        self.0.rsplit_once(':').and_then(|(_, p)| p.parse().ok())
    }

    pub fn family(&self) -> AddrFamily {
        if self.host().parse::<IpAddr>().is_ok() {
            AddrFamily::Ip
        } else {
            AddrFamily::Hostname
        }
    }
}

impl fmt::Display for MemberAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberAddr {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a member as seen by the local node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    /// The member is healthy and responsive.
    Alive,
    /// The member missed a probe round and is on its suspicion grace window.
    /// It returns to `Alive` if it refutes, or becomes `Faulty` on timeout.
    Suspect,
    /// The member is confirmed failed.
    Faulty,
    /// The member announced an orderly departure.
    Leave,
    /// The member was flap-damped by its peers.
    Damped,
}

impl MemberStatus {
    /// Tie-break precedence between two reports at the same incarnation.
    /// A report wins only with strictly higher precedence.
    pub fn precedence(self) -> u8 {
        match self {
            MemberStatus::Alive => 0,
            MemberStatus::Suspect => 1,
            MemberStatus::Faulty | MemberStatus::Leave | MemberStatus::Damped => 2,
        }
    }

    /// Whether the failure detector should still probe this member.
    /// Suspects stay probeable so a direct ping can re-confirm them alive.
    pub fn is_pingable(self) -> bool {
        matches!(self, MemberStatus::Alive | MemberStatus::Suspect)
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemberStatus::Alive => "alive",
            MemberStatus::Suspect => "suspect",
            MemberStatus::Faulty => "faulty",
            MemberStatus::Leave => "leave",
            MemberStatus::Damped => "damped",
        };
        f.write_str(s)
    }
}

/// One known participant of the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub address: MemberAddr,
    pub status: MemberStatus,
    /// Logical clock owned by the member itself; higher values win.
    pub incarnation_number: u64,
    /// Flap counter maintained by the damping subprotocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damp_score: Option<u32>,
}

impl Member {
    pub fn new(address: MemberAddr, status: MemberStatus, incarnation_number: u64) -> Self {
        Self {
            address,
            status,
            incarnation_number,
            damp_score: None,
        }
    }
}

/// A proposed membership delta, the unit of gossip dissemination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub address: MemberAddr,
    pub status: MemberStatus,
    pub incarnation_number: u64,
    /// Node that observed the change, if known. Used to avoid echoing a
    /// change straight back to its origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<MemberAddr>,
    /// How many outgoing messages have carried this change so far.
    /// Local bookkeeping only; never authoritative on the wire.
    #[serde(skip)]
    pub piggyback_count: u32,
}

impl Change {
    pub fn new(
        address: MemberAddr,
        status: MemberStatus,
        incarnation_number: u64,
        source: Option<MemberAddr>,
    ) -> Self {
        Self {
            address,
            status,
            incarnation_number,
            source,
            piggyback_count: 0,
        }
    }
}

/// Kind of an accepted membership update, one per status plus `New` for
/// first observation of an address.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    New,
    Alive,
    Suspect,
    Faulty,
    Leave,
    Damped,
}

impl From<MemberStatus> for UpdateKind {
    fn from(status: MemberStatus) -> Self {
        match status {
            MemberStatus::Alive => UpdateKind::Alive,
            MemberStatus::Suspect => UpdateKind::Suspect,
            MemberStatus::Faulty => UpdateKind::Faulty,
            MemberStatus::Leave => UpdateKind::Leave,
            MemberStatus::Damped => UpdateKind::Damped,
        }
    }
}

impl UpdateKind {
    /// Stat suffix for the `membership-update.*` counters.
    pub fn stat_name(self) -> &'static str {
        match self {
            UpdateKind::New => "new",
            UpdateKind::Alive => "alive",
            UpdateKind::Suspect => "suspect",
            UpdateKind::Faulty => "faulty",
            UpdateKind::Leave => "leave",
            UpdateKind::Damped => "damped",
        }
    }
}

/// An update actually applied by reconciliation, as reported to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipUpdate {
    pub kind: UpdateKind,
    pub member: Member,
    pub source: Option<MemberAddr>,
}

impl MembershipUpdate {
    /// The change to re-disseminate for this update.
    pub fn to_change(&self) -> Change {
        Change::new(
            self.member.address.clone(),
            self.member.status,
            self.member.incarnation_number,
            self.source.clone(),
        )
    }
}
