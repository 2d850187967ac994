//! Request forwarding glue.
//!
//! When a keyed request lands on a node that does not own the key, the
//! facade hands it to this proxy, which replays it against the owner and
//! returns the owner's response. Each hop is tagged with an operation id so
//! receivers can deduplicate retried requests.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::membership::types::MemberAddr;

/// Header carrying the per-request operation id across hops.
pub const OP_ID_HEADER: &str = "x-ringshard-op";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProxyMethod {
    Get,
    Post,
    Put,
}

/// An HTTP-shaped request to replay against the owning node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    pub method: ProxyMethod,
    /// Absolute path on the owner, e.g. `/kv/some-key`.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl ProxyRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: ProxyMethod::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: ProxyMethod::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: ProxyMethod::Put,
            path: path.into(),
            body: Some(body),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: Value,
}

/// Per-owner outcome of a batched `handle_or_proxy_all` dispatch.
#[derive(Debug)]
pub struct GroupResponse {
    pub owner: MemberAddr,
    pub keys: Vec<String>,
    pub result: Result<ProxyResponse>,
}

#[derive(Clone)]
pub struct HttpProxy {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpProxy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
        }
    }

    /// Replay `request` against `owner` and return its response. Non-JSON
    /// response bodies come back as plain strings.
    pub async fn forward(&self, owner: &MemberAddr, request: &ProxyRequest) -> Result<ProxyResponse> {
        if !request.path.starts_with('/') {
            bail!("proxy path {:?} must be absolute", request.path);
        }
        let url = format!("http://{}{}", owner, request.path);
        let op_id = Uuid::new_v4().to_string();

        let builder = match request.method {
            ProxyMethod::Get => self.http.get(url),
            ProxyMethod::Post => self.http.post(url),
            ProxyMethod::Put => self.http.put(url),
        };
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let response = builder
            .header(OP_ID_HEADER, op_id)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(ProxyResponse { status, body })
    }
}
