//! Blocking HTTP implementations of the core call seams.
//!
//! The core drives these from plain threads (client callers and the
//! server's dispatch workers), so they use `ureq` rather than the async
//! stack the server runs on.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use rlock_core::error::TransportError;
use rlock_core::transport::{CallbackConnector, LockCallback, LockService};
use rlock_core::types::{ClientId, LockId, LockStatus, Xid};

use crate::handlers::{CallbackRequest, LockRequest, StatResponse, StatusResponse};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

fn agent() -> ureq::Agent {
    // No read timeout: a basic-mode acquire and every revoke legitimately
    // block until another party lets go.
    ureq::AgentBuilder::new().timeout_connect(CONNECT_TIMEOUT).build()
}

fn map_error(endpoint: &str, err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Status(code, _) => TransportError::rpc(endpoint, format!("HTTP {code}")),
        ureq::Error::Transport(t) => match t.kind() {
            ureq::ErrorKind::ConnectionFailed | ureq::ErrorKind::Dns => {
                TransportError::unreachable(endpoint)
            }
            _ => TransportError::rpc(endpoint, t),
        },
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, response: ureq::Response) -> Result<T, TransportError> {
    response.into_json().map_err(|e| TransportError::BadReply {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}

fn post<B: Serialize>(agent: &ureq::Agent, url: &str, body: &B) -> Result<LockStatus, TransportError> {
    let response = agent.post(url).send_json(body).map_err(|e| map_error(url, e))?;
    let reply: StatusResponse = decode(url, response)?;
    Ok(reply.status)
}

/// Client → server calls against `rlock serve`.
pub struct HttpLockService {
    base: String,
    agent: ureq::Agent,
}

impl HttpLockService {
    /// `base` is the server URL, e.g. `http://127.0.0.1:3100`.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            agent: agent(),
        }
    }

    fn call(&self, path: &str, lid: LockId, client: &ClientId, xid: Xid) -> Result<LockStatus, TransportError> {
        let request = LockRequest {
            lid,
            client_id: client.clone(),
            xid,
        };
        post(&self.agent, &format!("{}/{}", self.base, path), &request)
    }
}

impl LockService for HttpLockService {
    fn acquire(&self, lid: LockId, client: &ClientId, xid: Xid) -> Result<LockStatus, TransportError> {
        self.call("acquire", lid, client, xid)
    }

    fn release(&self, lid: LockId, client: &ClientId, xid: Xid) -> Result<LockStatus, TransportError> {
        self.call("release", lid, client, xid)
    }

    fn stat(&self, lid: LockId) -> Result<u64, TransportError> {
        let url = format!("{}/stat/{}", self.base, lid);
        let response = self.agent.get(&url).call().map_err(|e| map_error(&url, e))?;
        let reply: StatResponse = decode(&url, response)?;
        Ok(reply.acquires)
    }
}

/// Server → client calls against a client's callback listener.
pub struct HttpLockCallback {
    base: String,
    agent: ureq::Agent,
}

impl LockCallback for HttpLockCallback {
    fn revoke(&self, lid: LockId, xid: Xid) -> Result<LockStatus, TransportError> {
        post(&self.agent, &format!("{}/revoke", self.base), &CallbackRequest { lid, xid })
    }

    fn retry(&self, lid: LockId, xid: Xid) -> Result<LockStatus, TransportError> {
        post(&self.agent, &format!("{}/retry", self.base), &CallbackRequest { lid, xid })
    }
}

/// Resolves a client ID (its `host:port` callback address) to an HTTP handle.
pub struct HttpCallbackConnector {
    agent: ureq::Agent,
}

impl HttpCallbackConnector {
    pub fn new() -> Self {
        Self { agent: agent() }
    }
}

impl CallbackConnector for HttpCallbackConnector {
    fn connect(&self, client: &ClientId) -> Result<Arc<dyn LockCallback>, TransportError> {
        Ok(Arc::new(HttpLockCallback {
            base: format!("http://{}", client),
            agent: self.agent.clone(),
        }))
    }
}
