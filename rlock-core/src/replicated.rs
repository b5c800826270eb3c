//! Replicated caching lock server.
//!
//! Same grant rules as [`CachingLockServer`](crate::server::CachingLockServer),
//! with three differences that make it safe to run behind an RSM:
//!
//! - every request carries an xid and replays are answered from the
//!   [`DedupTable`] without touching state;
//! - a handler never waits on a client. The queue head gets RETRY at once
//!   and the handoff is driven entirely by the dispatcher;
//! - the whole lock state can be serialized and restored on another
//!   replica.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::dedup::{DedupRecord, DedupTable};
use crate::dispatch::{CallbackKind, Dispatch, DispatchConfig, DispatchStats, Dispatcher};
use crate::error::{StateError, TransportError};
use crate::replica::{PrimaryGate, Replica, StateTransfer};
use crate::server_table::ServerLockTable;
use crate::snapshot::ServerSnapshot;
use crate::transport::{CallbackConnector, CallbackTable, LockService};
use crate::types::{ClientId, LockId, LockStatus, Xid};

#[derive(Default)]
struct ReplicatedState {
    table: ServerLockTable,
    requests: DedupTable,
}

pub struct ReplicatedLockServer {
    state: Mutex<ReplicatedState>,
    dispatcher: Dispatcher,
    grants: AtomicU64,
}

impl ReplicatedLockServer {
    /// Create the server and register it for state transfer with `replica`.
    pub fn new<R>(replica: Arc<R>, connector: Arc<dyn CallbackConnector>) -> io::Result<Arc<Self>>
    where
        R: Replica + 'static,
    {
        Self::with_config(replica, connector, DispatchConfig::default())
    }

    pub fn with_config<R>(
        replica: Arc<R>,
        connector: Arc<dyn CallbackConnector>,
        config: DispatchConfig,
    ) -> io::Result<Arc<Self>>
    where
        R: Replica + 'static,
    {
        let callbacks = Arc::new(CallbackTable::new(connector));
        let gate: Arc<dyn PrimaryGate> = replica.clone();
        let server = Arc::new(Self {
            state: Mutex::new(ReplicatedState::default()),
            dispatcher: Dispatcher::spawn(callbacks, gate, config)?,
            grants: AtomicU64::new(0),
        });
        replica.register_state_transfer(server.clone());
        Ok(server)
    }

    pub fn acquire(&self, lid: LockId, client: &ClientId, xid: Xid) -> LockStatus {
        let mut state = self.state.lock();
        if let Some(reply) = state.requests.replay(lid, client, xid) {
            debug!(client = %client, lid = %lid, xid, reply = %reply, "duplicate acquire, replaying reply");
            return reply;
        }

        let ReplicatedState { table, requests } = &mut *state;
        let lock = table.entry(lid);

        let reply = if lock.grantable_to(client) {
            lock.grant(client);
            self.grants.fetch_add(1, Ordering::SeqCst);
            info!(client = %client, lid = %lid, xid, "lock granted");
            if let Some(head) = lock.head() {
                let head_xid = requests.last_xid(lid, head).unwrap_or_default();
                self.dispatcher
                    .retry(Dispatch::new(Some(client.clone()), head.clone(), lid, head_xid));
            }
            LockStatus::Ok
        } else {
            lock.enqueue(client);
            if lock.is_head(client) {
                if let Some(holder) = lock.owner() {
                    let holder_xid = requests.last_xid(lid, holder).unwrap_or_default();
                    self.dispatcher
                        .revoke(Dispatch::new(Some(client.clone()), holder.clone(), lid, holder_xid));
                }
            }
            debug!(client = %client, lid = %lid, xid, head = ?lock.head(), "acquire deferred");
            LockStatus::Retry
        };

        requests.record(lid, client, xid, reply);
        reply
    }

    /// Accepted only from the owner, carrying the xid of its latest acquire.
    /// Anything else is acknowledged and ignored.
    pub fn release(&self, lid: LockId, client: &ClientId, xid: Xid) -> LockStatus {
        let mut state = self.state.lock();
        let ReplicatedState { table, requests } = &mut *state;
        let lock = table.entry(lid);

        if !lock.is_owned_by(client) || requests.last_xid(lid, client) != Some(xid) {
            warn!(
                client = %client,
                lid = %lid,
                xid,
                owner = ?lock.owner(),
                last_xid = ?requests.last_xid(lid, client),
                "ignoring invalid release"
            );
            return LockStatus::Ok;
        }

        let next = lock.release();
        info!(client = %client, lid = %lid, xid, next = ?next, "lock released");
        if let Some(next) = next {
            let next_xid = requests.last_xid(lid, &next).unwrap_or_default();
            self.dispatcher
                .retry(Dispatch::new(Some(client.clone()), next, lid, next_xid));
        }
        LockStatus::Ok
    }

    /// Number of grants this replica has executed, across all locks.
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

    pub fn request_record(&self, lid: LockId, client: &ClientId) -> Option<DedupRecord> {
        self.state.lock().requests.get(lid, client)
    }

    pub fn dispatch_stats(&self, kind: CallbackKind) -> DispatchStats {
        self.dispatcher.stats(kind)
    }

    /// Re-issue the callbacks implied by the current state.
    ///
    /// Queued work is not part of a snapshot, so after a restore or a
    /// promotion the new primary cannot know which callbacks were still in
    /// flight. Every owner gets a retry, in case it was handed the lock but
    /// never told; every owner with waiters also gets a revoke. Both are
    /// harmless when redundant.
    fn reschedule(&self, state: &ReplicatedState) {
        let mut scheduled = 0usize;
        for (lid, lock) in state.table.iter() {
            let Some(owner) = lock.owner() else {
                continue;
            };
            let xid = state.requests.last_xid(lid, owner).unwrap_or_default();
            self.dispatcher
                .retry(Dispatch::new(None, owner.clone(), lid, xid));
            scheduled += 1;
            if lock.has_waiters() {
                self.dispatcher
                    .revoke(Dispatch::new(lock.head().cloned(), owner.clone(), lid, xid));
                scheduled += 1;
            }
        }
        info!(scheduled, "rescheduled pending callbacks");
    }
}

impl StateTransfer for ReplicatedLockServer {
    fn serialize_state(&self) -> Result<Vec<u8>, StateError> {
        let state = self.state.lock();
        ServerSnapshot::capture(&state.table, &state.requests).encode()
    }

    fn restore_state(&self, bytes: &[u8]) -> Result<(), StateError> {
        let (table, requests) = ServerSnapshot::decode(bytes)?.into_state()?;
        let mut state = self.state.lock();
        state.table = table;
        state.requests = requests;
        info!(locks = state.table.len(), "state restored");
        self.reschedule(&state);
        Ok(())
    }

    fn on_promoted(&self) {
        let state = self.state.lock();
        self.reschedule(&state);
    }
}

impl LockService for ReplicatedLockServer {
    fn acquire(&self, lid: LockId, client: &ClientId, xid: Xid) -> Result<LockStatus, TransportError> {
        Ok(ReplicatedLockServer::acquire(self, lid, client, xid))
    }

    fn release(&self, lid: LockId, client: &ClientId, xid: Xid) -> Result<LockStatus, TransportError> {
        Ok(ReplicatedLockServer::release(self, lid, client, xid))
    }

    fn stat(&self, lid: LockId) -> Result<u64, TransportError> {
        Ok(ReplicatedLockServer::stat(self, lid))
    }
}
