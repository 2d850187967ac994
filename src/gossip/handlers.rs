//! Protocol API Handlers
//!
//! HTTP endpoints serving the inbound side of the gossip protocol. Every
//! handler applies the piggybacked changes first, then does its own work;
//! none of them blocks the detector's outbound loop. Malformed bodies are
//! rejected by the `Json` extractor before any membership side effect.

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::protocol::{
    JoinRequest, JoinResponse, LeaveRequest, LeaveResponse, PingRequest, PingReqRequest,
    PingReqResponse, PingResponse, ProtocolErrorBody, ENDPOINT_JOIN, ENDPOINT_LEAVE,
    ENDPOINT_PING, ENDPOINT_PING_REQ,
};
use super::service::GossipService;
use crate::membership::types::{Change, MemberStatus};
use crate::node::errors::JoinError;

/// Router serving the four protocol endpoints.
pub fn protocol_router(service: Arc<GossipService>) -> Router {
    Router::new()
        .route(ENDPOINT_PING, post(handle_ping))
        .route(ENDPOINT_PING_REQ, post(handle_ping_req))
        .route(ENDPOINT_JOIN, post(handle_join))
        .route(ENDPOINT_LEAVE, post(handle_leave))
        .layer(Extension(service))
}

/// Direct probe: absorb the sender's piggyback, answer with ours.
pub async fn handle_ping(
    Extension(service): Extension<Arc<GossipService>>,
    Json(request): Json<PingRequest>,
) -> Json<PingResponse> {
    service.stats.incr("ping.recv");
    service.apply_changes(&request.changes);

    let changes = service.dissemination.get_changes(
        Some(request.checksum),
        service.membership.checksum(),
        &request.source,
    );
    Json(PingResponse { changes })
}

/// Indirect probe: ping the target on behalf of the sender and report
/// whether it answered.
pub async fn handle_ping_req(
    Extension(service): Extension<Arc<GossipService>>,
    Json(request): Json<PingReqRequest>,
) -> Json<PingReqResponse> {
    service.stats.incr("ping-req.recv");
    service.apply_changes(&request.changes);

    let probe = PingRequest {
        source: service.local_addr().clone(),
        checksum: service.membership.checksum(),
        changes: service.dissemination.get_changes(
            None,
            service.membership.checksum(),
            &request.target,
        ),
    };

    let started = Instant::now();
    let ping_status = match service
        .client
        .ping(&request.target, &probe, service.config().ping_timeout)
        .await
    {
        Ok(response) => {
            service.apply_changes(&response.changes);
            true
        }
        Err(err) => {
            debug!(peer = %request.target, %err, "ping-req probe could not reach target");
            false
        }
    };
    service.stats.record_timing("ping-req", started.elapsed());

    let changes = service.dissemination.get_changes(
        Some(request.checksum),
        service.membership.checksum(),
        &request.source,
    );
    Json(PingReqResponse {
        ping_status,
        target: request.target,
        changes,
    })
}

/// Cluster entry point: validate the joiner, add it alive, and hand it the
/// full membership snapshot.
pub async fn handle_join(
    Extension(service): Extension<Arc<GossipService>>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, (StatusCode, Json<ProtocolErrorBody>)> {
    service.stats.incr("join.recv");

    if request.source == *service.local_addr() {
        return Err(reject(JoinError::SelfJoin));
    }
    if request.app != service.app() {
        return Err(reject(JoinError::AppMismatch {
            expected: service.app().to_string(),
            actual: request.app,
        }));
    }

    service.apply_changes(&[Change::new(
        request.source.clone(),
        MemberStatus::Alive,
        request.incarnation_number,
        Some(service.local_addr().clone()),
    )]);

    Ok(Json(JoinResponse {
        app: service.app().to_string(),
        coordinator: service.local_addr().clone(),
        membership: service.membership.get_state(),
    }))
}

/// Orderly departure is acknowledged but changes nothing here: the leaving
/// node's own gossip carries its `leave` status to the cluster.
pub async fn handle_leave(
    Extension(service): Extension<Arc<GossipService>>,
    Json(request): Json<LeaveRequest>,
) -> Json<LeaveResponse> {
    debug!(source = %request.source, "leave acknowledged");
    service.stats.incr("leave.recv");
    Json(LeaveResponse {})
}

fn reject(error: JoinError) -> (StatusCode, Json<ProtocolErrorBody>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ProtocolErrorBody {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }),
    )
}
