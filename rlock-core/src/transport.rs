//! Call seams between clients and servers.
//!
//! Everything above this module talks to its peers only through these
//! traits. The servers implement [`LockService`] and the client implements
//! [`LockCallback`] directly, which makes an in-process deployment (tests,
//! benches) a matter of wiring; the CLI crate provides HTTP implementations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::types::{ClientId, LockId, LockStatus, Xid};

/// Client → server calls.
///
/// For the replicated server this is the RSM client: the implementation
/// routes to the current primary and retransmits across failover with the
/// same xid.
pub trait LockService: Send + Sync {
    fn acquire(&self, lid: LockId, client: &ClientId, xid: Xid) -> Result<LockStatus, TransportError>;

    fn release(&self, lid: LockId, client: &ClientId, xid: Xid) -> Result<LockStatus, TransportError>;

    /// Diagnostic grant counter of the server.
    fn stat(&self, lid: LockId) -> Result<u64, TransportError>;
}

/// Server → client calls.
pub trait LockCallback: Send + Sync {
    /// Ask the client to give `lid` back. Blocks until the client has sent
    /// its release (or failed to).
    fn revoke(&self, lid: LockId, xid: Xid) -> Result<LockStatus, TransportError>;

    /// Tell the client a deferred acquire of `lid` may now succeed.
    fn retry(&self, lid: LockId, xid: Xid) -> Result<LockStatus, TransportError>;
}

/// Binds a client ID to a callable handle.
pub trait CallbackConnector: Send + Sync {
    fn connect(&self, client: &ClientId) -> Result<Arc<dyn LockCallback>, TransportError>;
}

/// Lookup table of callback handles keyed by client ID.
///
/// Handles are bound lazily on first use and dropped again after a failed
/// call, so a client that restarts on the same address is rebound.
pub struct CallbackTable {
    connector: Arc<dyn CallbackConnector>,
    handles: Mutex<HashMap<ClientId, Arc<dyn LockCallback>>>,
}

impl CallbackTable {
    pub fn new(connector: Arc<dyn CallbackConnector>) -> Self {
        Self {
            connector,
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn handle(&self, client: &ClientId) -> Result<Arc<dyn LockCallback>, TransportError> {
        if let Some(handle) = self.handles.lock().get(client) {
            return Ok(handle.clone());
        }
        // Bind outside the table lock; a racing bind for the same client
        // just overwrites an equivalent handle.
        let handle = self.connector.connect(client)?;
        self.handles.lock().insert(client.clone(), handle.clone());
        Ok(handle)
    }

    pub fn evict(&self, client: &ClientId) {
        self.handles.lock().remove(client);
    }

    pub fn revoke(&self, client: &ClientId, lid: LockId, xid: Xid) -> Result<LockStatus, TransportError> {
        self.call(client, |h| h.revoke(lid, xid))
    }

    pub fn retry(&self, client: &ClientId, lid: LockId, xid: Xid) -> Result<LockStatus, TransportError> {
        self.call(client, |h| h.retry(lid, xid))
    }

    fn call<F>(&self, client: &ClientId, f: F) -> Result<LockStatus, TransportError>
    where
        F: FnOnce(&dyn LockCallback) -> Result<LockStatus, TransportError>,
    {
        let handle = self.handle(client)?;
        let result = f(handle.as_ref());
        if result.is_err() {
            self.evict(client);
        }
        result
    }
}

/// In-process connector: clients register themselves under their ID.
///
/// Targets are held weakly so a server holding the network does not keep
/// its clients alive. An endpoint can be taken offline to simulate an
/// unreachable client; handles already bound by a [`CallbackTable`] see the
/// change too.
#[derive(Default)]
pub struct LocalNetwork {
    endpoints: Mutex<HashMap<ClientId, Arc<LocalEndpoint>>>,
}

struct LocalEndpoint {
    client: ClientId,
    target: Weak<dyn LockCallback>,
    online: AtomicBool,
}

impl LocalEndpoint {
    fn target(&self) -> Result<Arc<dyn LockCallback>, TransportError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(TransportError::unreachable(self.client.as_str()));
        }
        self.target
            .upgrade()
            .ok_or_else(|| TransportError::unreachable(self.client.as_str()))
    }
}

impl LockCallback for LocalEndpoint {
    fn revoke(&self, lid: LockId, xid: Xid) -> Result<LockStatus, TransportError> {
        self.target()?.revoke(lid, xid)
    }

    fn retry(&self, lid: LockId, xid: Xid) -> Result<LockStatus, TransportError> {
        self.target()?.retry(lid, xid)
    }
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, client: ClientId, endpoint: Arc<dyn LockCallback>) {
        let entry = Arc::new(LocalEndpoint {
            client: client.clone(),
            target: Arc::downgrade(&endpoint),
            online: AtomicBool::new(true),
        });
        self.endpoints.lock().insert(client, entry);
    }

    /// Take `client` offline or bring it back.
    pub fn set_online(&self, client: &ClientId, online: bool) {
        if let Some(entry) = self.endpoints.lock().get(client) {
            entry.online.store(online, Ordering::SeqCst);
        }
    }
}

impl CallbackConnector for LocalNetwork {
    fn connect(&self, client: &ClientId) -> Result<Arc<dyn LockCallback>, TransportError> {
        let entry = self
            .endpoints
            .lock()
            .get(client)
            .cloned()
            .ok_or_else(|| TransportError::unreachable(client.as_str()))?;
        Ok(entry)
    }
}
