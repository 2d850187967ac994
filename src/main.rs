use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use dashmap::DashMap;
use ringshard::gossip::handlers::protocol_router;
use ringshard::membership::types::MemberStatus;
use ringshard::node::proxy::ProxyRequest;
use ringshard::node::{Config, Node, Routed};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use sysinfo::{CpuExt, System, SystemExt};

type KvStore = Arc<DashMap<String, Value>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --app <name> --bind <addr:port> [--seed <addr:port>]... [--hosts-file <path>]",
            args[0]
        );
        eprintln!("Example: {} --app demo --bind 127.0.0.1:3000", args[0]);
        eprintln!(
            "Example: {} --app demo --bind 127.0.0.1:3001 --seed 127.0.0.1:3000",
            args[0]
        );
        std::process::exit(1);
    }

    let mut app: Option<String> = None;
    let mut bind: Option<String> = None;
    let mut seeds: Vec<String> = vec![];
    let mut hosts_file: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--app" => {
                app = Some(args[i + 1].clone());
                i += 2;
            }
            "--bind" => {
                bind = Some(args[i + 1].clone());
                i += 2;
            }
            "--seed" => {
                seeds.push(args[i + 1].clone());
                i += 2;
            }
            "--hosts-file" => {
                hosts_file = Some(args[i + 1].clone());
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let app = app.unwrap_or_else(|| "ringshard".to_string());
    let bind = bind.expect("--bind is required");

    let mut config = Config::new(app, bind.clone())?;
    if let Some(path) = hosts_file {
        config.bootstrap_file = Some(path.into());
    }

    let node = Node::new(config)?;
    let store: KvStore = Arc::new(DashMap::new());

    tracing::info!("Starting node on {}", bind);
    if seeds.is_empty() {
        tracing::info!("No seeds given, starting as founder");
    } else {
        tracing::info!("Seed nodes: {:?}", seeds);
    }

    let router = Router::new()
        .merge(protocol_router(node.gossip().clone()))
        .route("/health/stats", get(handle_stats))
        .route("/kv/:key", get(handle_kv_get).put(handle_kv_put))
        .layer(Extension(node.clone()))
        .layer(Extension(store.clone()));

    // The listener must be up before bootstrap: seeds dial back while we
    // are still joining.
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("Listening on {}", bind);
    let server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            tracing::error!("server error: {}", err);
        }
    });

    let bootstrap_hosts = if seeds.is_empty() && node.gossip().config().bootstrap_file.is_none() {
        // Founder mode: a host list containing only ourselves.
        Some(vec![bind.clone()])
    } else if seeds.is_empty() {
        None
    } else {
        Some(seeds)
    };

    let joined = node.bootstrap(bootstrap_hosts).await?;
    tracing::info!("Bootstrapped via {} coordinator(s)", joined.len());
    tracing::info!("Press Ctrl+C to shutdown");

    server.await?;
    Ok(())
}

#[derive(Serialize)]
struct MemberInfo {
    address: String,
    status: String,
    incarnation: u64,
}

#[derive(Serialize)]
struct NodeStatsResponse {
    address: String,
    app: String,
    ready: bool,
    checksum: u32,
    num_members: usize,
    alive_members: usize,
    ring_servers: usize,
    members: Vec<MemberInfo>,
    stats: Value,
    cpu_usage: f32,
    mem_used_mb: u64,
    mem_total_mb: u64,
}

async fn handle_stats(Extension(node): Extension<Arc<Node>>) -> Json<NodeStatsResponse> {
    let gossip = node.gossip();
    let members: Vec<MemberInfo> = gossip
        .membership
        .get_state()
        .iter()
        .map(|m| MemberInfo {
            address: m.address.to_string(),
            status: m.status.to_string(),
            incarnation: m.incarnation_number,
        })
        .collect();
    let alive = members
        .iter()
        .filter(|m| m.status == MemberStatus::Alive.to_string())
        .count();

    let mut sys = System::new_all();
    sys.refresh_cpu();
    sys.refresh_memory();
    let cpu_usage = sys.global_cpu_info().cpu_usage();
    // sysinfo reports memory in bytes.
    let mem_total_mb = sys.total_memory() / (1024 * 1024);
    let mem_used_mb = sys.used_memory() / (1024 * 1024);

    Json(NodeStatsResponse {
        address: node.whoami().to_string(),
        app: gossip.app().to_string(),
        ready: node.is_ready(),
        checksum: gossip.membership.checksum(),
        num_members: members.len(),
        alive_members: alive,
        ring_servers: gossip.ring.server_count(),
        members,
        stats: node.get_stats(),
        cpu_usage,
        mem_used_mb,
        mem_total_mb,
    })
}

/// Sharded GET: serve locally when this node owns the key, otherwise relay
/// the owner's answer.
async fn handle_kv_get(
    Extension(node): Extension<Arc<Node>>,
    Extension(store): Extension<KvStore>,
    Path(key): Path<String>,
) -> (StatusCode, Json<Value>) {
    let request = ProxyRequest::get(format!("/kv/{}", key));
    match node.handle_or_proxy(&key, &request).await {
        Ok(Routed::Local) => match store.get(&key) {
            Some(value) => (StatusCode::OK, Json(value.clone())),
            None => (StatusCode::NOT_FOUND, Json(Value::Null)),
        },
        Ok(Routed::Remote(response)) => (
            StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY),
            Json(response.body),
        ),
        Err(err) => {
            tracing::error!("kv get for {} failed: {}", key, err);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": err.to_string() })),
            )
        }
    }
}

/// Sharded PUT: store locally when this node owns the key, otherwise
/// forward to the owner.
async fn handle_kv_put(
    Extension(node): Extension<Arc<Node>>,
    Extension(store): Extension<KvStore>,
    Path(key): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let request = ProxyRequest::put(format!("/kv/{}", key), body.clone());
    match node.handle_or_proxy(&key, &request).await {
        Ok(Routed::Local) => {
            store.insert(key, body);
            (StatusCode::OK, Json(json!({ "stored": true })))
        }
        Ok(Routed::Remote(response)) => (
            StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY),
            Json(response.body),
        ),
        Err(err) => {
            tracing::error!("kv put for {} failed: {}", key, err);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": err.to_string() })),
            )
        }
    }
}
