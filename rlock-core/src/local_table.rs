//! Client-side per-lock state.
//!
//! Every local caller that references a lock takes a ticket and joins that
//! lock's FIFO queue. The ticket at the head of the queue is the one allowed
//! to use (or go fetch) the token, so the queue doubles as the admission
//! order and as the "is anyone still using this lock" check that revoke
//! handling waits on.
//!
//! The table itself does no blocking. [`CachingLockClient`](crate::client::CachingLockClient)
//! holds it behind one mutex and waits on the per-lock condition variable.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Condvar;

use crate::types::{LockId, Xid};

/// Position of a local caller in a lock's queue.
pub type Ticket = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
    /// This client does not own the lock
    None,
    /// Owned and cached, nobody using it
    Free,
    /// Owned and in use by the queue head
    Locked,
    /// Remote acquire in flight for the queue head
    Acquiring,
    /// Being handed back to the server
    Releasing,
}

/// Outcome of checking whether a ticket may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The cached token was handed to the caller
    Granted,
    /// The caller must fetch the token from the server
    Remote,
    /// Not this caller's turn yet
    Wait,
}

/// Next step for a revoke handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeStep {
    /// Local callers still queued, or another release is in flight
    Wait,
    /// Lock moved to RELEASING; send the release with this xid
    Release { xid: Xid },
    /// This client believes it does not own the lock
    NotOwned { xid: Xid },
    /// The revoke names a grant older than this client's latest acquire
    Stale,
}

pub struct LocalLock {
    state: LocalState,
    queue: VecDeque<Ticket>,
    retry: bool,
    /// xid of the latest acquire this client sent for the lock
    last_xid: Xid,
    cond: Arc<Condvar>,
}

impl LocalLock {
    fn new() -> Self {
        Self {
            state: LocalState::None,
            queue: VecDeque::new(),
            retry: false,
            last_xid: 0,
            cond: Arc::new(Condvar::new()),
        }
    }

    pub fn state(&self) -> LocalState {
        self.state
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_head(&self, ticket: Ticket) -> bool {
        self.queue.front() == Some(&ticket)
    }

    pub fn retry_pending(&self) -> bool {
        self.retry
    }

    pub fn last_xid(&self) -> Xid {
        self.last_xid
    }

    pub fn cond(&self) -> Arc<Condvar> {
        self.cond.clone()
    }

    fn expect_state(&self, lid: LockId, allowed: &[LocalState]) {
        assert!(
            allowed.contains(&self.state),
            "lock {lid}: illegal transition from {:?} (expected one of {:?})",
            self.state,
            allowed
        );
    }
}

#[derive(Default)]
pub struct LocalLockTable {
    locks: HashMap<LockId, LocalLock>,
    next_ticket: Ticket,
}

impl LocalLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The record for `lid`, created in NONE on first reference.
    pub fn entry(&mut self, lid: LockId) -> &mut LocalLock {
        self.locks.entry(lid).or_insert_with(LocalLock::new)
    }

    pub fn get(&self, lid: LockId) -> Option<&LocalLock> {
        self.locks.get(&lid)
    }

    pub fn state(&self, lid: LockId) -> LocalState {
        self.get(lid).map_or(LocalState::None, LocalLock::state)
    }

    /// Join the back of `lid`'s queue.
    pub fn enqueue(&mut self, lid: LockId) -> Ticket {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.entry(lid).queue.push_back(ticket);
        ticket
    }

    /// Let `ticket` proceed if it is at the head and the token is usable.
    pub fn admit(&mut self, lid: LockId, ticket: Ticket) -> Admission {
        let lock = self.entry(lid);
        if !lock.is_head(ticket) {
            return Admission::Wait;
        }
        match lock.state {
            LocalState::Free => {
                lock.state = LocalState::Locked;
                Admission::Granted
            }
            LocalState::None => {
                lock.state = LocalState::Acquiring;
                lock.retry = false;
                Admission::Remote
            }
            LocalState::Locked | LocalState::Acquiring | LocalState::Releasing => Admission::Wait,
        }
    }

    /// Note the xid of a remote acquire about to be sent for the queue head.
    pub fn record_xid(&mut self, lid: LockId, xid: Xid) {
        let lock = self.entry(lid);
        lock.expect_state(lid, &[LocalState::Acquiring]);
        lock.last_xid = xid;
    }

    /// Consume a delivered retry signal, if any.
    pub fn take_retry(&mut self, lid: LockId) -> bool {
        std::mem::take(&mut self.entry(lid).retry)
    }

    /// The server granted the lock to the queue head.
    pub fn granted(&mut self, lid: LockId) {
        let lock = self.entry(lid);
        lock.expect_state(lid, &[LocalState::Acquiring]);
        lock.state = LocalState::Locked;
    }

    /// The remote acquire for `ticket` failed; give the turn to the next caller.
    pub fn abandon(&mut self, lid: LockId, ticket: Ticket) {
        let lock = self.entry(lid);
        lock.expect_state(lid, &[LocalState::Acquiring]);
        lock.queue.retain(|t| *t != ticket);
        lock.state = LocalState::None;
    }

    /// The holder is done. Returns `false` if nobody held the lock.
    pub fn release(&mut self, lid: LockId) -> bool {
        let Some(lock) = self.locks.get_mut(&lid) else {
            return false;
        };
        if lock.state != LocalState::Locked {
            return false;
        }
        lock.queue.pop_front();
        // The next head, if any, picks the cached token up from FREE.
        lock.state = LocalState::Free;
        true
    }

    /// Record a retry signal from the server.
    pub fn signal_retry(&mut self, lid: LockId) {
        self.entry(lid).retry = true;
    }

    /// `xid` is the revoke's xid; `0` carries no grant and is never stale.
    pub fn begin_revoke(&mut self, lid: LockId, xid: Xid) -> RevokeStep {
        let lock = self.entry(lid);
        if xid != 0 && xid < lock.last_xid {
            return RevokeStep::Stale;
        }
        if !lock.queue.is_empty() || lock.state == LocalState::Releasing {
            return RevokeStep::Wait;
        }
        match lock.state {
            LocalState::Free => {
                lock.state = LocalState::Releasing;
                RevokeStep::Release { xid: lock.last_xid }
            }
            LocalState::None => RevokeStep::NotOwned { xid: lock.last_xid },
            // An empty queue rules out LOCKED and ACQUIRING.
            other => panic!("lock {lid}: revoke found {other:?} with an empty queue"),
        }
    }

    /// The release RPC finished. On failure the token stays cached.
    pub fn finish_revoke(&mut self, lid: LockId, released: bool) {
        let lock = self.entry(lid);
        lock.expect_state(lid, &[LocalState::Releasing]);
        lock.state = if released {
            LocalState::None
        } else {
            LocalState::Free
        };
    }
}
