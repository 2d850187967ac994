//! Node facade.
//!
//! One handle over the whole system: lifecycle (`bootstrap`, `admin_leave`,
//! `admin_join`, `destroy`), key routing (`lookup`, `handle_or_proxy`,
//! `handle_or_proxy_all`), events, and stats.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::info;

use super::config::Config;
use super::errors::NodeError;
use super::proxy::{GroupResponse, HttpProxy, ProxyRequest, ProxyResponse};
use super::stats::StatsProvider;
use crate::gossip::join;
use crate::gossip::service::{GossipService, NodeEvent};
use crate::membership::table::now_ms;
use crate::membership::types::{Change, MemberAddr, MemberStatus};

/// Outcome of [`Node::handle_or_proxy`].
#[derive(Debug)]
pub enum Routed {
    /// The local node owns the key; the caller handles the request.
    Local,
    /// The key belongs elsewhere; here is the owner's response.
    Remote(ProxyResponse),
}

pub struct Node {
    gossip: Arc<GossipService>,
    proxy: HttpProxy,
    ready: AtomicBool,
    /// Seed list retained from bootstrap so a rejoin can reuse it.
    seeds: Mutex<Vec<MemberAddr>>,
}

impl Node {
    pub fn new(config: Config) -> Result<Arc<Self>, NodeError> {
        config.validate()?;
        let proxy = HttpProxy::new(config.proxy_req_timeout);
        let gossip = GossipService::new(config);
        Ok(Arc::new(Self {
            gossip,
            proxy,
            ready: AtomicBool::new(false),
            seeds: Mutex::new(Vec::new()),
        }))
    }

    pub fn gossip(&self) -> &Arc<GossipService> {
        &self.gossip
    }

    pub fn whoami(&self) -> MemberAddr {
        self.gossip.local_addr().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.gossip.subscribe()
    }

    /// Owner of `key`. Falls back to the local node while the ring is
    /// empty, so single-node operation works before (and without) peers.
    pub fn lookup(&self, key: &str) -> MemberAddr {
        self.gossip.stats.incr("lookup");
        self.gossip
            .ring
            .lookup(key)
            .unwrap_or_else(|| self.whoami())
    }

    /// Join the cluster: resolve seeds, insert the local member alive, fan
    /// out joins, then start gossip and suspicion. Returns the coordinators
    /// that accepted.
    pub async fn bootstrap(
        &self,
        hosts: Option<Vec<String>>,
    ) -> Result<Vec<MemberAddr>, NodeError> {
        if self.is_ready() {
            return Err(NodeError::Lifecycle("node is already bootstrapped".into()));
        }
        if self.gossip.is_destroyed() {
            return Err(NodeError::Lifecycle("node is destroyed".into()));
        }

        let seeds = join::resolve_seed_hosts(&self.gossip, hosts).await?;
        *self.seeds.lock().unwrap() = seeds.clone();

        let local = self.whoami();
        self.gossip.apply_changes(&[Change::new(
            local.clone(),
            MemberStatus::Alive,
            now_ms(),
            Some(local),
        )]);

        let joined = join::admin_join(&self.gossip, &seeds).await?;

        Arc::clone(&self.gossip).start();
        self.ready.store(true, Ordering::SeqCst);
        self.gossip.emit(NodeEvent::Ready);
        info!(node = %self.whoami(), "bootstrap complete");
        Ok(joined)
    }

    /// Announce an orderly departure: flip the local member to `leave` (the
    /// change gossips out on remaining traffic), stop probing and suspicion.
    pub async fn admin_leave(&self) -> Result<&'static str, NodeError> {
        let member = self
            .gossip
            .membership
            .local_member()
            .ok_or_else(|| NodeError::Lifecycle("local member was never added".into()))?;
        if member.status == MemberStatus::Leave {
            return Err(NodeError::Lifecycle("node already left".into()));
        }

        let local = self.whoami();
        self.gossip.apply_changes(&[Change::new(
            local.clone(),
            MemberStatus::Leave,
            member.incarnation_number,
            Some(local),
        )]);
        self.gossip.stop_gossip();
        self.gossip.suspicion.stop_all();
        info!(node = %self.whoami(), "left the cluster");
        Ok("left")
    }

    /// (Re)join the cluster. After a leave this bumps the incarnation,
    /// restates alive, restarts gossip and suspicion, and re-runs the join
    /// fan-out against the bootstrap seeds.
    pub async fn admin_join(&self) -> Result<&'static str, NodeError> {
        let member = self
            .gossip
            .membership
            .local_member()
            .ok_or_else(|| NodeError::Lifecycle("cannot join before the local member is added".into()))?;

        let rejoining = member.status == MemberStatus::Leave;
        if rejoining {
            let local = self.whoami();
            self.gossip.apply_changes(&[Change::new(
                local.clone(),
                MemberStatus::Alive,
                member.incarnation_number + 1,
                Some(local),
            )]);
            self.gossip.suspicion.reenable();
            Arc::clone(&self.gossip).start_gossip();
        }

        let seeds = self.seeds.lock().unwrap().clone();
        join::admin_join(&self.gossip, &seeds).await?;
        Ok(if rejoining { "rejoined" } else { "joined" })
    }

    /// Route a keyed request: `Routed::Local` when this node owns the key,
    /// otherwise the owner's proxied response.
    pub async fn handle_or_proxy(
        &self,
        key: &str,
        request: &ProxyRequest,
    ) -> anyhow::Result<Routed> {
        let owner = self.lookup(key);
        if owner == self.whoami() {
            return Ok(Routed::Local);
        }
        self.gossip.stats.incr("proxy.send");
        let response = self.proxy.forward(&owner, request).await?;
        Ok(Routed::Remote(response))
    }

    /// Route a batch of keys: group them by owner, run `local_handler` once
    /// over the locally owned group, and dispatch one proxied request per
    /// remote owner, gathering all responses.
    pub async fn handle_or_proxy_all<F>(
        &self,
        keys: &[String],
        local_handler: F,
        request: &ProxyRequest,
    ) -> Vec<GroupResponse>
    where
        F: FnOnce(&[String]) -> Value,
    {
        let whoami = self.whoami();
        let mut groups: HashMap<MemberAddr, Vec<String>> = HashMap::new();
        for key in keys {
            groups.entry(self.lookup(key)).or_default().push(key.clone());
        }

        let mut responses = Vec::with_capacity(groups.len());
        if let Some(group_keys) = groups.remove(&whoami) {
            let body = local_handler(&group_keys);
            responses.push(GroupResponse {
                owner: whoami,
                keys: group_keys,
                result: Ok(ProxyResponse { status: 200, body }),
            });
        }
        let remote: Vec<(MemberAddr, Vec<String>)> = groups.into_iter().collect();
        self.dispatch_remote(remote, request, responses).await
    }

    async fn dispatch_remote(
        &self,
        remote: Vec<(MemberAddr, Vec<String>)>,
        request: &ProxyRequest,
        mut responses: Vec<GroupResponse>,
    ) -> Vec<GroupResponse> {
        let mut handles = Vec::with_capacity(remote.len());
        for (owner, group_keys) in remote {
            self.gossip.stats.incr("proxy.send");
            let proxy = self.proxy.clone();
            let request = request.clone();
            handles.push(tokio::spawn(async move {
                let result = proxy.forward(&owner, &request).await;
                GroupResponse {
                    owner,
                    keys: group_keys,
                    result,
                }
            }));
        }
        for handle in handles {
            if let Ok(response) = handle.await {
                responses.push(response);
            }
        }
        responses
    }

    pub fn register_stats_hook(
        &self,
        name: impl Into<String>,
        provider: Arc<dyn StatsProvider>,
    ) -> Result<(), NodeError> {
        self.gossip.stats.register_hook(name, provider)
    }

    pub fn get_stats(&self) -> Value {
        self.gossip.stats.get_stats()
    }

    /// Tear the node down: stops gossip, suspicion, and in-flight protocol
    /// tasks. Idempotent.
    pub async fn destroy(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.gossip.destroy();
    }
}
