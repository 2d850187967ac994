use std::path::PathBuf;
use std::time::Duration;

use super::errors::NodeError;
use crate::membership::types::MemberAddr;

/// Node configuration.
///
/// `app` and `host_port` are required; everything else has protocol
/// defaults. Constructed via [`Config::new`], which validates eagerly so
/// misconfiguration fails at construction rather than mid-protocol.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cluster namespace. Join requests carrying a different app are
    /// rejected, which keeps two clusters on shared hosts from merging.
    pub app: String,
    /// Local address in `host:port` form.
    pub host_port: String,
    /// Seed host list file; `./hosts.json` when unset.
    pub bootstrap_file: Option<PathBuf>,
    /// How many seeds must accept a join before bootstrap succeeds.
    pub join_size: usize,
    /// Fan-out width of the indirect ping-req probe.
    pub ping_req_size: usize,
    pub ping_timeout: Duration,
    pub ping_req_timeout: Duration,
    pub proxy_req_timeout: Duration,
    /// Floor of the protocol period; the detector never runs hotter.
    pub min_protocol_period: Duration,
    pub max_join_duration: Duration,
    pub suspicion_timeout: Duration,
    /// Replica points per server on the hash ring.
    pub ring_replica_points: u32,
}

impl Config {
    pub fn new(app: impl Into<String>, host_port: impl Into<String>) -> Result<Self, NodeError> {
        let config = Self {
            app: app.into(),
            host_port: host_port.into(),
            bootstrap_file: None,
            join_size: 3,
            ping_req_size: 3,
            ping_timeout: Duration::from_millis(1500),
            ping_req_timeout: Duration::from_millis(5000),
            proxy_req_timeout: Duration::from_millis(30_000),
            min_protocol_period: Duration::from_millis(200),
            max_join_duration: Duration::from_millis(300_000),
            suspicion_timeout: Duration::from_millis(5000),
            ring_replica_points: 100,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.app.trim().is_empty() {
            return Err(NodeError::Configuration("app must not be empty".into()));
        }
        let addr = MemberAddr::new(self.host_port.clone());
        if addr.host().is_empty() {
            return Err(NodeError::Configuration(format!(
                "hostPort {:?} has an empty host",
                self.host_port
            )));
        }
        if addr.port().is_none() {
            return Err(NodeError::Configuration(format!(
                "hostPort {:?} must be of the form host:port",
                self.host_port
            )));
        }
        Ok(())
    }

    pub fn local_addr(&self) -> MemberAddr {
        MemberAddr::new(self.host_port.clone())
    }
}
