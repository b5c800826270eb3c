//! Caching lock server without replication.
//!
//! Grants go to one client at a time and stay with it until another client
//! asks. The client at the head of a lock's wait queue has its acquire
//! handler parked until the current owner's release hands the lock over;
//! everyone behind it is told to RETRY and is woken by a retry callback
//! once it reaches the head.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::dispatch::{CallbackKind, Dispatch, DispatchConfig, DispatchStats, Dispatcher};
use crate::error::TransportError;
use crate::replica::AlwaysPrimary;
use crate::server_table::ServerLockTable;
use crate::transport::{CallbackConnector, CallbackTable, LockService};
use crate::types::{ClientId, LockId, LockStatus, Xid};

struct Handoff {
    client: ClientId,
    cond: Arc<Condvar>,
}

#[derive(Default)]
struct ServerState {
    table: ServerLockTable,
    /// Acquire handlers parked until a release hands them the lock
    handoffs: HashMap<LockId, Handoff>,
}

pub struct CachingLockServer {
    state: Mutex<ServerState>,
    dispatcher: Dispatcher,
    grants: AtomicU64,
}

impl CachingLockServer {
    pub fn new(connector: Arc<dyn CallbackConnector>) -> io::Result<Self> {
        Self::with_config(connector, DispatchConfig::default())
    }

    pub fn with_config(connector: Arc<dyn CallbackConnector>, config: DispatchConfig) -> io::Result<Self> {
        let callbacks = Arc::new(CallbackTable::new(connector));
        let dispatcher = Dispatcher::spawn(callbacks, Arc::new(AlwaysPrimary), config)?;
        Ok(Self {
            state: Mutex::new(ServerState::default()),
            dispatcher,
            grants: AtomicU64::new(0),
        })
    }

    pub fn acquire(&self, lid: LockId, client: &ClientId) -> LockStatus {
        let mut state = self.state.lock();
        let lock = state.table.entry(lid);

        if lock.grantable_to(client) {
            lock.grant(client);
            let next = lock.head().cloned();
            self.granted(lid, client, next);
            return LockStatus::Ok;
        }

        lock.enqueue(client);
        if !lock.is_head(client) {
            debug!(client = %client, lid = %lid, head = ?lock.head(), "queued behind another client");
            return LockStatus::Retry;
        }

        let Some(holder) = lock.owner().cloned() else {
            unreachable!("an unowned lock is grantable to its queue head");
        };

        let cond = Arc::new(Condvar::new());
        state.handoffs.insert(
            lid,
            Handoff {
                client: client.clone(),
                cond: cond.clone(),
            },
        );
        self.dispatcher
            .revoke(Dispatch::new(Some(client.clone()), holder.clone(), lid, 0));

        debug!(client = %client, lid = %lid, holder = %holder, "waiting for revoke");
        while !state.table.entry(lid).is_owned_by(client) {
            cond.wait(&mut state);
        }
        // The next head may already have parked itself behind us.
        if state.handoffs.get(&lid).is_some_and(|h| h.client == *client) {
            state.handoffs.remove(&lid);
        }

        let next = state.table.entry(lid).head().cloned();
        self.granted(lid, client, next);
        LockStatus::Ok
    }

    /// A release from anyone but the owner is ignored.
    pub fn release(&self, lid: LockId, client: &ClientId) -> LockStatus {
        let mut state = self.state.lock();
        let lock = state.table.entry(lid);

        if !lock.is_owned_by(client) {
            warn!(client = %client, lid = %lid, owner = ?lock.owner(), "ignoring release from non-owner");
            return LockStatus::Ok;
        }

        let next = lock.release();
        info!(client = %client, lid = %lid, next = ?next, "lock released");

        if let Some(next) = next {
            match state.handoffs.get(&lid) {
                Some(handoff) if handoff.client == next => {
                    handoff.cond.notify_all();
                }
                _ => self
                    .dispatcher
                    .retry(Dispatch::new(Some(client.clone()), next, lid, 0)),
            }
        }
        LockStatus::Ok
    }

    /// Number of grants made so far, across all locks.
    pub fn stat(&self, lid: LockId) -> u64 {
        debug!(lid = %lid, "stat request");
        self.grants.load(Ordering::SeqCst)
    }

    pub fn owner(&self, lid: LockId) -> Option<ClientId> {
        self.state.lock().table.owner(lid).cloned()
    }

    pub fn waiters(&self, lid: LockId) -> Vec<ClientId> {
        self.state
            .lock()
            .table
            .get(lid)
            .map(|lock| lock.waiters().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dispatch_stats(&self, kind: CallbackKind) -> DispatchStats {
        self.dispatcher.stats(kind)
    }

    fn granted(&self, lid: LockId, client: &ClientId, next: Option<ClientId>) {
        self.grants.fetch_add(1, Ordering::SeqCst);
        info!(client = %client, lid = %lid, "lock granted");
        // Whoever is at the head now was told RETRY and may go ahead and
        // ask for a revoke.
        if let Some(next) = next {
            self.dispatcher
                .retry(Dispatch::new(Some(client.clone()), next, lid, 0));
        }
    }
}

impl LockService for CachingLockServer {
    fn acquire(&self, lid: LockId, client: &ClientId, _xid: Xid) -> Result<LockStatus, TransportError> {
        Ok(CachingLockServer::acquire(self, lid, client))
    }

    fn release(&self, lid: LockId, client: &ClientId, _xid: Xid) -> Result<LockStatus, TransportError> {
        Ok(CachingLockServer::release(self, lid, client))
    }

    fn stat(&self, lid: LockId) -> Result<u64, TransportError> {
        Ok(CachingLockServer::stat(self, lid))
    }
}
