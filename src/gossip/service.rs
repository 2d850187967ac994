//! Gossip service.
//!
//! Owns the member table, the dissemination buffer, the suspicion timers,
//! the hash ring, and the protocol-period loop. Every ingress and egress of
//! membership state funnels through [`GossipService::apply_changes`], which
//! reconciles a batch and synchronously feeds the ring, the dissemination
//! buffer, the suspicion timers, and the stats counters before emitting one
//! aggregate event, so a lookup never observes a ring that lags the table.

use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::GossipClient;
use super::protocol::{PingRequest, PingReqRequest};
use crate::membership::dissemination::Dissemination;
use crate::membership::suspicion::SuspicionSet;
use crate::membership::table::Membership;
use crate::membership::types::{Change, Member, MemberAddr, MemberStatus, MembershipUpdate};
use crate::node::config::Config;
use crate::node::stats::Stats;
use crate::ring::HashRing;

/// Sliding window of ping round-trip samples feeding the protocol rate.
const RTT_WINDOW: usize = 10;

/// Events observable through [`GossipService::subscribe`].
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// Bootstrap completed; the node serves lookups and protocol traffic.
    Ready,
    /// One reconciled batch of membership updates.
    MembershipChanged(Vec<MembershipUpdate>),
    /// The alive server set behind the ring actually changed.
    RingChanged {
        added: Vec<MemberAddr>,
        removed: Vec<MemberAddr>,
    },
    /// The dissemination cap moved because the member count did.
    MaxPiggybackAdjusted(u32),
}

pub struct GossipService {
    config: Config,
    local: MemberAddr,
    pub membership: Membership,
    pub dissemination: Dissemination,
    pub suspicion: SuspicionSet,
    pub ring: HashRing,
    pub stats: Stats,
    pub(crate) client: GossipClient,
    events: broadcast::Sender<NodeEvent>,
    destroyed: AtomicBool,
    gossip_running: AtomicBool,
    is_pinging: AtomicBool,
    rtt_window: Mutex<VecDeque<Duration>>,
    expired_rx: Mutex<Option<mpsc::UnboundedReceiver<(MemberAddr, u64)>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl GossipService {
    pub fn new(config: Config) -> Arc<Self> {
        let local = config.local_addr();
        let (suspicion, expired_rx) = SuspicionSet::new(config.suspicion_timeout);
        let (events, _) = broadcast::channel(64);
        let ring = HashRing::new(config.ring_replica_points);

        Arc::new(Self {
            local: local.clone(),
            membership: Membership::new(local),
            dissemination: Dissemination::new(),
            suspicion,
            ring,
            stats: Stats::new(),
            client: GossipClient::new(),
            events,
            destroyed: AtomicBool::new(false),
            gossip_running: AtomicBool::new(false),
            is_pinging: AtomicBool::new(false),
            rtt_window: Mutex::new(VecDeque::with_capacity(RTT_WINDOW)),
            expired_rx: Mutex::new(Some(expired_rx)),
            tasks: Mutex::new(Vec::new()),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn local_addr(&self) -> &MemberAddr {
        &self.local
    }

    pub fn app(&self) -> &str {
        &self.config.app
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: NodeEvent) {
        let _ = self.events.send(event);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn is_gossip_running(&self) -> bool {
        self.gossip_running.load(Ordering::SeqCst)
    }

    /// Reconcile a batch of changes and propagate the accepted updates to
    /// every dependent structure. Returns the applied updates.
    pub fn apply_changes(&self, changes: &[Change]) -> Vec<MembershipUpdate> {
        let updates = self.membership.update(changes);
        if updates.is_empty() {
            return updates;
        }

        let mut ring_added = Vec::new();
        let mut ring_removed = Vec::new();

        for update in &updates {
            self.dissemination.record(update.to_change());
            self.stats
                .incr(&format!("membership-update.{}", update.kind.stat_name()));

            let member = &update.member;
            if member.status == MemberStatus::Alive {
                if self.ring.add_server(&member.address) {
                    ring_added.push(member.address.clone());
                }
            } else if self.ring.remove_server(&member.address) {
                ring_removed.push(member.address.clone());
            }

            if member.address != self.local {
                if member.status == MemberStatus::Suspect {
                    self.suspicion
                        .start(member.address.clone(), member.incarnation_number);
                } else {
                    self.suspicion.cancel(&member.address);
                }
            }
        }

        self.stats.set_gauge("num-members", self.membership.len() as i64);
        if let Some(cap) = self.dissemination.adjust_max_piggyback(self.membership.len()) {
            debug!(cap, "max piggyback count adjusted");
            self.stats.set_gauge("max-piggyback", cap as i64);
            self.emit(NodeEvent::MaxPiggybackAdjusted(cap));
        }

        if !ring_added.is_empty() || !ring_removed.is_empty() {
            self.emit(NodeEvent::RingChanged {
                added: ring_added,
                removed: ring_removed,
            });
        }
        self.emit(NodeEvent::MembershipChanged(updates.clone()));
        updates
    }

    /// Spawn the suspicion reaper and the protocol-period loop.
    pub fn start(self: Arc<Self>) {
        Self::spawn_reaper(&self);
        self.start_gossip();
    }

    /// The reaper turns expired suspicions into `faulty` declarations,
    /// unless gossip moved the member along in the meantime.
    fn spawn_reaper(service: &Arc<Self>) {
        let Some(mut expired_rx) = service.expired_rx.lock().unwrap().take() else {
            return;
        };
        let reaper = Arc::clone(service);
        let handle = tokio::spawn(async move {
            while let Some((address, incarnation)) = expired_rx.recv().await {
                if reaper.is_destroyed() {
                    break;
                }
                let Some(member) = reaper.membership.get(&address) else {
                    continue;
                };
                if member.status == MemberStatus::Suspect
                    && member.incarnation_number == incarnation
                {
                    info!(%address, "suspicion timeout elapsed, declaring faulty");
                    reaper.suspicion.cancel(&address);
                    reaper.apply_changes(&[Change::new(
                        address,
                        MemberStatus::Faulty,
                        incarnation,
                        Some(reaper.local.clone()),
                    )]);
                }
            }
        });
        service.tasks.lock().unwrap().push(handle);
    }

    /// Start the protocol-period loop; a no-op if it is already running.
    pub fn start_gossip(self: Arc<Self>) {
        if self.is_destroyed() || self.gossip_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let looper = Arc::clone(&self);
        let handle = tokio::spawn(looper.gossip_loop());
        self.tasks.lock().unwrap().push(handle);
    }

    /// Let the protocol-period loop wind down after its current period.
    pub fn stop_gossip(&self) {
        self.gossip_running.store(false, Ordering::SeqCst);
    }

    async fn gossip_loop(self: Arc<Self>) {
        // Jitter the first period so simultaneously started nodes don't
        // probe in lockstep.
        let jitter_ms = rand::thread_rng()
            .gen_range(0..=self.config.min_protocol_period.as_millis() as u64);
        tokio::time::sleep(Duration::from_millis(jitter_ms)).await;

        loop {
            if self.is_destroyed() || !self.is_gossip_running() {
                break;
            }
            let period_start = Instant::now();
            self.protocol_period().await;
            self.stats
                .record_timing("protocol-period", period_start.elapsed());

            // The next period starts `protocol_rate` after this one began.
            let due = self.protocol_rate();
            let elapsed = period_start.elapsed();
            if due > elapsed {
                tokio::time::sleep(due - elapsed).await;
            }
        }
        debug!("protocol period loop stopped");
    }

    /// One protocol period: a direct ping, falling back to the indirect
    /// ping-req subprotocol. At most one outbound ping is in flight.
    async fn protocol_period(&self) {
        if self.is_pinging.swap(true, Ordering::SeqCst) {
            return;
        }
        self.probe_next_member().await;
        self.is_pinging.store(false, Ordering::SeqCst);
    }

    async fn probe_next_member(&self) {
        let Some(target) = self.membership.next_probe_target() else {
            return;
        };

        let request = PingRequest {
            source: self.local.clone(),
            checksum: self.membership.checksum(),
            changes: self.dissemination.get_changes(
                None,
                self.membership.checksum(),
                &target.address,
            ),
        };

        self.stats.incr("ping.send");
        let started = Instant::now();
        match self
            .client
            .ping(&target.address, &request, self.config.ping_timeout)
            .await
        {
            Ok(response) => {
                let rtt = started.elapsed();
                self.stats.record_timing("ping", rtt);
                self.record_rtt(rtt);
                self.apply_changes(&response.changes);
            }
            Err(err) => {
                debug!(peer = %target.address, %err, "direct ping failed");
                self.ping_req_fanout(&target).await;
            }
        }
    }

    /// Indirect probe: ask `ping_req_size` random other members to ping the
    /// target for us. The first helper that reaches it short-circuits the
    /// fan-out; if none does, the target becomes suspect.
    async fn ping_req_fanout(&self, target: &Member) {
        let helpers = self.membership.get_random_pingable_members(
            self.config.ping_req_size,
            &[self.local.clone(), target.address.clone()],
        );

        let mut reachable = false;
        if !helpers.is_empty() {
            let started = Instant::now();
            let (tx, mut rx) = mpsc::channel(helpers.len());
            let mut probes = Vec::with_capacity(helpers.len());
            for helper in helpers {
                let request = PingReqRequest {
                    source: self.local.clone(),
                    target: target.address.clone(),
                    checksum: self.membership.checksum(),
                    changes: self.dissemination.get_changes(
                        None,
                        self.membership.checksum(),
                        &helper.address,
                    ),
                };
                self.stats.incr("ping-req.send");
                let client = self.client.clone();
                let timeout = self.config.ping_req_timeout;
                let tx = tx.clone();
                probes.push(tokio::spawn(async move {
                    let result = client.ping_req(&helper.address, &request, timeout).await;
                    let _ = tx.send(result).await;
                }));
            }
            drop(tx);

            while let Some(result) = rx.recv().await {
                match result {
                    Ok(response) => {
                        self.apply_changes(&response.changes);
                        if response.ping_status {
                            reachable = true;
                            break;
                        }
                    }
                    Err(err) => {
                        debug!(peer = %target.address, %err, "ping-req probe failed");
                    }
                }
            }
            for probe in probes {
                probe.abort();
            }
            self.stats
                .record_timing("ping-req.other-members", started.elapsed());
        }

        // Re-read the incarnation: gossip may have advanced it while the
        // fan-out was in flight.
        let incarnation = self
            .membership
            .get(&target.address)
            .map(|m| m.incarnation_number)
            .unwrap_or(target.incarnation_number);

        if reachable {
            self.apply_changes(&[Change::new(
                target.address.clone(),
                MemberStatus::Alive,
                incarnation,
                Some(self.local.clone()),
            )]);
        } else {
            warn!(peer = %target.address, "unreachable directly and indirectly, suspecting");
            self.apply_changes(&[Change::new(
                target.address.clone(),
                MemberStatus::Suspect,
                incarnation,
                Some(self.local.clone()),
            )]);
        }
    }

    fn record_rtt(&self, rtt: Duration) {
        let mut window = self.rtt_window.lock().unwrap();
        if window.len() == RTT_WINDOW {
            window.pop_front();
        }
        window.push_back(rtt);
    }

    /// Period length: twice the median observed ping RTT, floored at the
    /// configured minimum.
    fn protocol_rate(&self) -> Duration {
        let window = self.rtt_window.lock().unwrap();
        if window.is_empty() {
            return self.config.min_protocol_period;
        }
        let mut samples: Vec<Duration> = window.iter().copied().collect();
        drop(window);
        samples.sort();
        let median = samples[samples.len() / 2];
        (median * 2).max(self.config.min_protocol_period)
    }

    /// Stop everything: loops, timers, in-flight tasks. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_gossip();
        self.suspicion.stop_all();
        let mut tasks = self.tasks.lock().unwrap();
        for task in tasks.drain(..) {
            task.abort();
        }
        info!("gossip service destroyed");
    }
}
