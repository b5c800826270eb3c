//! Server-side per-lock ownership and FIFO wait queues.

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::types::{ClientId, LockId};

#[derive(Debug, Default, Clone)]
pub struct ServerLock {
    owner: Option<ClientId>,
    queue: VecDeque<ClientId>,
    /// Mirrors `queue` for O(1) membership checks
    waiting: HashSet<ClientId>,
}

impl ServerLock {
    pub fn owner(&self) -> Option<&ClientId> {
        self.owner.as_ref()
    }

    pub fn is_owned_by(&self, client: &ClientId) -> bool {
        self.owner.as_ref() == Some(client)
    }

    pub fn head(&self) -> Option<&ClientId> {
        self.queue.front()
    }

    pub fn is_head(&self, client: &ClientId) -> bool {
        self.queue.front() == Some(client)
    }

    pub fn has_waiters(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn is_waiting(&self, client: &ClientId) -> bool {
        self.waiting.contains(client)
    }

    pub fn waiters(&self) -> impl Iterator<Item = &ClientId> {
        self.queue.iter()
    }

    /// Whether `client` can be made owner right now: the lock is unowned
    /// and nobody is ahead of it, or it already owns the lock.
    pub fn grantable_to(&self, client: &ClientId) -> bool {
        match &self.owner {
            Some(owner) => owner == client,
            None => self.queue.front().is_none_or(|head| head == client),
        }
    }

    /// Make `client` owner, removing it from the head of the queue if it was
    /// waiting there.
    pub fn grant(&mut self, client: &ClientId) {
        if self.is_head(client) {
            self.pop_head();
        }
        self.owner = Some(client.clone());
    }

    /// Append `client` unless it is already queued. Returns whether it was added.
    pub fn enqueue(&mut self, client: &ClientId) -> bool {
        if !self.waiting.insert(client.clone()) {
            return false;
        }
        self.queue.push_back(client.clone());
        true
    }

    pub fn pop_head(&mut self) -> Option<ClientId> {
        let head = self.queue.pop_front()?;
        self.waiting.remove(&head);
        Some(head)
    }

    /// Clear ownership and hand the lock to the queue head, if any. Returns
    /// the new owner.
    pub fn release(&mut self) -> Option<ClientId> {
        self.owner = self.pop_head();
        self.owner.clone()
    }

    /// Rebuild a record from its owner and queue. Fails with the first
    /// client that appears twice in `queue`.
    pub(crate) fn from_parts(owner: Option<ClientId>, queue: Vec<ClientId>) -> Result<Self, ClientId> {
        let mut lock = ServerLock {
            owner,
            ..Default::default()
        };
        for client in queue {
            if !lock.enqueue(&client) {
                return Err(client);
            }
        }
        Ok(lock)
    }
}

/// Every lock the server has seen, keyed by lock ID.
///
/// Ordered so that snapshots and diagnostics list locks deterministically.
#[derive(Debug, Default, Clone)]
pub struct ServerLockTable {
    locks: BTreeMap<LockId, ServerLock>,
}

impl ServerLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The record for `lid`, created unowned on first reference.
    pub fn entry(&mut self, lid: LockId) -> &mut ServerLock {
        self.locks.entry(lid).or_default()
    }

    pub fn get(&self, lid: LockId) -> Option<&ServerLock> {
        self.locks.get(&lid)
    }

    pub fn owner(&self, lid: LockId) -> Option<&ClientId> {
        self.get(lid).and_then(ServerLock::owner)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LockId, &ServerLock)> {
        self.locks.iter().map(|(lid, lock)| (*lid, lock))
    }

    pub(crate) fn insert(&mut self, lid: LockId, lock: ServerLock) {
        self.locks.insert(lid, lock);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
