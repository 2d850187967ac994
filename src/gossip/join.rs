//! Join / bootstrap protocol.
//!
//! A joining node fans `join` requests out to seed hosts, `join_size` at a
//! time, and merges the membership snapshot of every coordinator that
//! accepts. Rounds retry with jittered exponential backoff until enough
//! coordinators accepted or `max_join_duration` runs out.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::protocol::JoinRequest;
use super::service::GossipService;
use crate::membership::types::{AddrFamily, Change, Member, MemberAddr};
use crate::node::errors::{JoinError, NodeError};

/// Per-seed timeout of one join attempt; the overall deadline is
/// `max_join_duration`.
const JOIN_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(3);

/// Backoff between join rounds: doubled from the floor up to the cap, plus
/// up to 50 ms of jitter.
const JOIN_BACKOFF_FLOOR: Duration = Duration::from_millis(150);
const JOIN_BACKOFF_CAP: Duration = Duration::from_millis(1200);

/// Default seed file consulted when neither a host list nor a bootstrap
/// file was configured.
const DEFAULT_HOSTS_FILE: &str = "./hosts.json";

/// Resolve the seed host list: a caller-provided list wins, then the
/// configured bootstrap file, then `./hosts.json`.
pub async fn resolve_seed_hosts(
    service: &GossipService,
    provided: Option<Vec<String>>,
) -> Result<Vec<MemberAddr>, NodeError> {
    let hosts: Vec<String> = match provided {
        Some(hosts) => hosts,
        None => {
            let path = service
                .config()
                .bootstrap_file
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HOSTS_FILE));
            let raw = tokio::fs::read_to_string(&path).await.map_err(|err| {
                NodeError::Lifecycle(format!(
                    "cannot read hosts file {}: {}",
                    path.display(),
                    err
                ))
            })?;
            serde_json::from_str(&raw).map_err(|err| {
                NodeError::Configuration(format!(
                    "hosts file {} is not a JSON array of \"host:port\" strings: {}",
                    path.display(),
                    err
                ))
            })?
        }
    };

    if hosts.is_empty() {
        return Err(NodeError::Lifecycle("bootstrap host list is empty".into()));
    }

    let seeds: Vec<MemberAddr> = hosts.into_iter().map(MemberAddr::new).collect();
    check_family_kinship(service.local_addr(), &seeds);
    Ok(seeds)
}

/// Warn when the local address family (IP vs hostname) disagrees with the
/// majority of the seed list; mixed families usually mean a config mistake.
fn check_family_kinship(local: &MemberAddr, seeds: &[MemberAddr]) {
    let ip_count = seeds
        .iter()
        .filter(|s| s.family() == AddrFamily::Ip)
        .count();
    let majority = if ip_count * 2 >= seeds.len() {
        AddrFamily::Ip
    } else {
        AddrFamily::Hostname
    };
    if local.family() != majority {
        warn!(
            %local,
            "local address family differs from the majority of the seed list"
        );
    }
}

/// Fan join requests out to the seeds until `join_size` coordinators
/// accepted, the seed list cannot reach that count, or the deadline
/// expires. Returns the coordinators that accepted.
pub async fn admin_join(
    service: &Arc<GossipService>,
    seeds: &[MemberAddr],
) -> Result<Vec<MemberAddr>, NodeError> {
    let local = service.local_addr().clone();
    let local_member = service
        .membership
        .local_member()
        .ok_or_else(|| NodeError::Lifecycle("cannot join before the local member is added".into()))?;

    let candidates: Vec<MemberAddr> = seeds
        .iter()
        .filter(|s| **s != local)
        .cloned()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let config = service.config();
    let required = config.join_size.min(candidates.len());
    if required == 0 {
        info!("no non-local seeds, starting as cluster founder");
        return Ok(Vec::new());
    }

    let deadline = Instant::now() + config.max_join_duration;
    let started = Instant::now();
    let mut joined: HashSet<MemberAddr> = HashSet::new();
    let mut backoff = JOIN_BACKOFF_FLOOR;

    loop {
        if service.is_destroyed() {
            return Err(JoinError::DestroyedDuringJoin.into());
        }

        let mut round: Vec<MemberAddr> = candidates
            .iter()
            .filter(|c| !joined.contains(*c))
            .cloned()
            .collect();
        round.shuffle(&mut rand::thread_rng());
        round.truncate(required - joined.len());

        let accepted = join_round(service, &local_member, round).await;
        for coordinator in accepted {
            joined.insert(coordinator);
        }

        if joined.len() >= required {
            info!(accepted = joined.len(), "join complete");
            return Ok(joined.into_iter().collect());
        }
        if Instant::now() >= deadline {
            return Err(JoinError::Exhausted {
                elapsed_ms: started.elapsed().as_millis() as u64,
                accepted: joined.len(),
                required,
            }
            .into());
        }

        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..50));
        tokio::time::sleep(backoff + jitter).await;
        backoff = (backoff * 2).min(JOIN_BACKOFF_CAP);
    }
}

/// One concurrent round of join attempts. Returns the seeds that accepted.
async fn join_round(
    service: &Arc<GossipService>,
    local_member: &Member,
    targets: Vec<MemberAddr>,
) -> Vec<MemberAddr> {
    if targets.is_empty() {
        return Vec::new();
    }

    let (tx, mut rx) = mpsc::channel(targets.len());
    for target in targets {
        let request = JoinRequest {
            app: service.app().to_string(),
            source: service.local_addr().clone(),
            incarnation_number: local_member.incarnation_number,
        };
        let client = service.client.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = client.join(&target, &request, JOIN_ATTEMPT_TIMEOUT).await;
            let _ = tx.send((target, result)).await;
        });
    }
    drop(tx);

    let mut accepted = Vec::new();
    while let Some((target, result)) = rx.recv().await {
        match result {
            Ok(response) => {
                if response.app != service.app() {
                    warn!(
                        seed = %target,
                        app = %response.app,
                        "seed answered for a different app, ignoring"
                    );
                    continue;
                }
                let changes: Vec<Change> = response
                    .membership
                    .iter()
                    .map(|m| {
                        Change::new(
                            m.address.clone(),
                            m.status,
                            m.incarnation_number,
                            Some(response.coordinator.clone()),
                        )
                    })
                    .collect();
                service.apply_changes(&changes);
                info!(coordinator = %response.coordinator, "join accepted");
                accepted.push(target);
            }
            Err(err) => {
                debug!(seed = %target, %err, "join attempt failed");
            }
        }
    }
    accepted
}
