//! Outbound protocol calls.
//!
//! One `reqwest` client shared by the detector, the handlers, and the join
//! fan-out. Every call has a hard timeout and no retries: a probe that
//! times out is failure-detector input, not something to paper over.

use anyhow::{bail, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::protocol::{
    JoinRequest, JoinResponse, PingRequest, PingReqRequest, PingReqResponse, PingResponse,
    ENDPOINT_JOIN, ENDPOINT_PING, ENDPOINT_PING_REQ,
};
use crate::membership::types::MemberAddr;

#[derive(Clone)]
pub struct GossipClient {
    http: reqwest::Client,
}

impl Default for GossipClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GossipClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    async fn post<Req, Resp>(
        &self,
        target: &MemberAddr,
        endpoint: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("http://{}{}", target, endpoint);
        let response = self
            .http
            .post(url)
            .json(request)
            .timeout(timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("{} to {} returned {}", endpoint, target, response.status());
        }
        Ok(response.json().await?)
    }

    pub async fn ping(
        &self,
        target: &MemberAddr,
        request: &PingRequest,
        timeout: Duration,
    ) -> Result<PingResponse> {
        self.post(target, ENDPOINT_PING, request, timeout).await
    }

    pub async fn ping_req(
        &self,
        helper: &MemberAddr,
        request: &PingReqRequest,
        timeout: Duration,
    ) -> Result<PingReqResponse> {
        self.post(helper, ENDPOINT_PING_REQ, request, timeout).await
    }

    pub async fn join(
        &self,
        seed: &MemberAddr,
        request: &JoinRequest,
        timeout: Duration,
    ) -> Result<JoinResponse> {
        self.post(seed, ENDPOINT_JOIN, request, timeout).await
    }
}
