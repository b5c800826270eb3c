//! Caching lock client.
//!
//! A client keeps every lock the server grants it until the server asks for
//! it back, so repeated acquires of the same lock by threads of the same
//! process cost no RPC. Local callers are admitted strictly in arrival
//! order; a revoke from the server waits until no local caller is using or
//! queued for the lock before handing it back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult, TransportError};
use crate::local_table::{Admission, LocalLockTable, LocalState, RevokeStep};
use crate::transport::{LockCallback, LockService};
use crate::types::{ClientId, LockId, LockStatus, Xid};

/// Called while handling a revoke, before the lock goes back to the server.
///
/// Upper layers use this to flush state protected by the lock.
pub trait ReleaseHook: Send + Sync {
    fn before_release(&self, lid: LockId);
}

pub struct CachingLockClient {
    id: ClientId,
    server: Arc<dyn LockService>,
    hook: Option<Arc<dyn ReleaseHook>>,
    table: Mutex<LocalLockTable>,
    last_xid: AtomicU64,
}

impl CachingLockClient {
    /// `id` must be the address at which this client receives revoke and
    /// retry callbacks.
    pub fn new(id: impl Into<ClientId>, server: Arc<dyn LockService>) -> Self {
        Self {
            id: id.into(),
            server,
            hook: None,
            table: Mutex::new(LocalLockTable::new()),
            last_xid: AtomicU64::new(0),
        }
    }

    pub fn with_release_hook(mut self, hook: Arc<dyn ReleaseHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Current local state of `lid`.
    pub fn state(&self, lid: LockId) -> LocalState {
        self.table.lock().state(lid)
    }

    /// Local callers holding or waiting for `lid`.
    pub fn local_waiters(&self, lid: LockId) -> usize {
        self.table.lock().get(lid).map_or(0, |lock| lock.queue_len())
    }

    fn next_xid(&self) -> Xid {
        self.last_xid.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Block until this caller holds `lid`.
    ///
    /// Only a failure to reach the server, or an IOERR reply, is reported;
    /// contention is always waited out.
    pub fn acquire(&self, lid: LockId) -> ClientResult<()> {
        let mut table = self.table.lock();
        let ticket = table.enqueue(lid);
        let cond = table.entry(lid).cond();

        loop {
            match table.admit(lid, ticket) {
                Admission::Granted => {
                    debug!(client = %self.id, lid = %lid, "granted from cache");
                    return Ok(());
                }
                Admission::Remote => break,
                Admission::Wait => cond.wait(&mut table),
            }
        }

        loop {
            let xid = self.next_xid();
            table.record_xid(lid, xid);
            let reply = MutexGuard::unlocked(&mut table, || self.server.acquire(lid, &self.id, xid));
            debug!(client = %self.id, lid = %lid, xid, reply = ?reply, "remote acquire returned");

            match reply {
                Ok(LockStatus::Ok) => {
                    table.granted(lid);
                    info!(client = %self.id, lid = %lid, xid, "lock granted by server");
                    return Ok(());
                }
                Ok(LockStatus::Retry) => {
                    while !table.take_retry(lid) {
                        cond.wait(&mut table);
                    }
                }
                Ok(status @ LockStatus::IoErr) => {
                    table.abandon(lid, ticket);
                    cond.notify_all();
                    return Err(ClientError::Server { lid, status });
                }
                Err(err) => {
                    warn!(client = %self.id, lid = %lid, error = %err, "remote acquire failed");
                    table.abandon(lid, ticket);
                    cond.notify_all();
                    return Err(err.into());
                }
            }
        }
    }

    /// Give `lid` back to the next local caller, or cache it as FREE.
    pub fn release(&self, lid: LockId) -> ClientResult<()> {
        let mut table = self.table.lock();
        if !table.release(lid) {
            return Err(ClientError::NotHeld(lid));
        }
        table.entry(lid).cond().notify_all();
        debug!(client = %self.id, lid = %lid, "released locally");
        Ok(())
    }

    /// Acquire `lid` and release it when the guard drops.
    pub fn lock(&self, lid: LockId) -> ClientResult<LockGuard<'_>> {
        self.acquire(lid)?;
        Ok(LockGuard { client: self, lid })
    }

    pub fn stat(&self, lid: LockId) -> ClientResult<u64> {
        Ok(self.server.stat(lid)?)
    }

    /// Server-initiated request to hand `lid` back.
    ///
    /// Never preempts a local holder: waits for the local queue to drain
    /// first. A revoke whose xid predates this client's latest acquire of
    /// `lid` refers to an ownership already given back and is acknowledged
    /// at once. Answers IOERR if the release could not be delivered, which
    /// makes the server's dispatcher send the revoke again later.
    pub fn revoke_handler(&self, lid: LockId, xid: Xid) -> LockStatus {
        debug!(client = %self.id, lid = %lid, xid, "revoke requested");
        let mut table = self.table.lock();
        let cond = table.entry(lid).cond();

        let step = loop {
            match table.begin_revoke(lid, xid) {
                RevokeStep::Wait => cond.wait(&mut table),
                step => break step,
            }
        };

        match step {
            RevokeStep::Release { xid: acquire_xid } => {
                let reply = MutexGuard::unlocked(&mut table, || {
                    if let Some(hook) = &self.hook {
                        hook.before_release(lid);
                    }
                    self.server.release(lid, &self.id, acquire_xid)
                });
                let released = self.check_release(lid, reply);
                table.finish_revoke(lid, released);
                cond.notify_all();
                if released {
                    info!(client = %self.id, lid = %lid, "lock handed back to server");
                    LockStatus::Ok
                } else {
                    LockStatus::IoErr
                }
            }
            RevokeStep::NotOwned { xid: acquire_xid } => {
                drop(table);
                // The server may have assigned us the lock after this client
                // gave up on it; releasing clears that. Otherwise it is ignored.
                let reply = self.server.release(lid, &self.id, acquire_xid);
                if self.check_release(lid, reply) {
                    LockStatus::Ok
                } else {
                    LockStatus::IoErr
                }
            }
            RevokeStep::Stale => {
                debug!(client = %self.id, lid = %lid, xid, "ignoring stale revoke");
                LockStatus::Ok
            }
            RevokeStep::Wait => unreachable!("revoke loop only exits on a terminal step"),
        }
    }

    /// Server-initiated signal that a deferred acquire of `lid` may succeed.
    pub fn retry_handler(&self, lid: LockId, xid: Xid) -> LockStatus {
        debug!(client = %self.id, lid = %lid, xid, "retry signalled");
        let mut table = self.table.lock();
        table.signal_retry(lid);
        table.entry(lid).cond().notify_all();
        LockStatus::Ok
    }

    fn check_release(&self, lid: LockId, reply: Result<LockStatus, TransportError>) -> bool {
        match reply {
            Ok(_) => true,
            Err(err) => {
                warn!(client = %self.id, lid = %lid, error = %err, "release rpc failed");
                false
            }
        }
    }
}

impl LockCallback for CachingLockClient {
    fn revoke(&self, lid: LockId, xid: Xid) -> Result<LockStatus, TransportError> {
        Ok(self.revoke_handler(lid, xid))
    }

    fn retry(&self, lid: LockId, xid: Xid) -> Result<LockStatus, TransportError> {
        Ok(self.retry_handler(lid, xid))
    }
}

/// Holds a lock of a [`CachingLockClient`] until dropped.
pub struct LockGuard<'a> {
    client: &'a CachingLockClient,
    lid: LockId,
}

impl LockGuard<'_> {
    pub fn lid(&self) -> LockId {
        self.lid
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.client.release(self.lid) {
            warn!(client = %self.client.id, lid = %self.lid, error = %err, "guard release failed");
        }
    }
}
