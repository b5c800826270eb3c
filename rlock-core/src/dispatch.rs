//! Background delivery of revoke and retry callbacks.
//!
//! Servers never call clients from inside a request handler. They enqueue a
//! [`Dispatch`] and one dedicated worker per callback kind delivers it in
//! FIFO order. A failed delivery goes to the back of its queue and is tried
//! again after a backoff, forever. Workers drop work while the local replica
//! is not primary, so only the primary ever talks to clients.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::replica::PrimaryGate;
use crate::transport::CallbackTable;
use crate::types::{ClientId, LockId, LockStatus, Xid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    Revoke,
    Retry,
}

impl std::fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallbackKind::Revoke => write!(f, "revoke"),
            CallbackKind::Retry => write!(f, "retry"),
        }
    }
}

/// One pending callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Client whose request caused the callback, if any
    pub sender: Option<ClientId>,
    pub receiver: ClientId,
    pub lid: LockId,
    pub xid: Xid,
}

impl Dispatch {
    pub fn new(sender: Option<ClientId>, receiver: ClientId, lid: LockId, xid: Xid) -> Self {
        Self {
            sender,
            receiver,
            lid,
            xid,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Pause before a failed delivery is put back on its queue
    pub retry_backoff: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::from_millis(100),
        }
    }
}

/// Delivery counters, per worker kind.
#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    requeued: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub requeued: u64,
    /// Items discarded because the replica was not primary
    pub dropped: u64,
}

impl Counters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.delivered.load(Ordering::SeqCst),
            requeued: self.requeued.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
        }
    }
}

enum Job {
    Deliver(Dispatch),
    Shutdown,
}

struct Queue {
    tx: Sender<Job>,
    counters: Arc<Counters>,
}

impl Queue {
    fn push(&self, kind: CallbackKind, item: Dispatch) {
        debug!(%kind, receiver = %item.receiver, lid = %item.lid, xid = item.xid, "callback queued");
        // Workers only exit after the dispatcher is dropped.
        let _ = self.tx.send(Job::Deliver(item));
    }
}

pub struct Dispatcher {
    revokes: Queue,
    retries: Queue,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn spawn(
        callbacks: Arc<CallbackTable>,
        gate: Arc<dyn PrimaryGate>,
        config: DispatchConfig,
    ) -> io::Result<Self> {
        let mut workers = Vec::with_capacity(2);
        let revokes = Self::spawn_worker(CallbackKind::Revoke, &callbacks, &gate, &config, &mut workers)?;
        let retries = Self::spawn_worker(CallbackKind::Retry, &callbacks, &gate, &config, &mut workers)?;
        Ok(Self {
            revokes,
            retries,
            workers,
        })
    }

    fn spawn_worker(
        kind: CallbackKind,
        callbacks: &Arc<CallbackTable>,
        gate: &Arc<dyn PrimaryGate>,
        config: &DispatchConfig,
        workers: &mut Vec<JoinHandle<()>>,
    ) -> io::Result<Queue> {
        let (tx, rx) = mpsc::channel();
        let counters = Arc::new(Counters::default());
        let worker = Worker {
            kind,
            rx,
            requeue: tx.clone(),
            callbacks: callbacks.clone(),
            gate: gate.clone(),
            backoff: config.retry_backoff,
            counters: counters.clone(),
        };
        let handle = thread::Builder::new()
            .name(format!("rlock-{kind}"))
            .spawn(move || worker.run())?;
        workers.push(handle);
        Ok(Queue { tx, counters })
    }

    pub fn revoke(&self, item: Dispatch) {
        self.revokes.push(CallbackKind::Revoke, item);
    }

    pub fn retry(&self, item: Dispatch) {
        self.retries.push(CallbackKind::Retry, item);
    }

    pub fn stats(&self, kind: CallbackKind) -> DispatchStats {
        match kind {
            CallbackKind::Revoke => self.revokes.counters.snapshot(),
            CallbackKind::Retry => self.retries.counters.snapshot(),
        }
    }

    /// Stop both workers and wait for them. A worker blocked inside a
    /// callback finishes that call first.
    pub fn shutdown(mut self) {
        self.stop();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }

    fn stop(&self) {
        let _ = self.revokes.tx.send(Job::Shutdown);
        let _ = self.retries.tx.send(Job::Shutdown);
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Workers are detached here; `shutdown` is the joining variant.
        self.stop();
    }
}

struct Worker {
    kind: CallbackKind,
    rx: Receiver<Job>,
    requeue: Sender<Job>,
    callbacks: Arc<CallbackTable>,
    gate: Arc<dyn PrimaryGate>,
    backoff: Duration,
    counters: Arc<Counters>,
}

impl Worker {
    fn run(self) {
        while let Ok(job) = self.rx.recv() {
            let item = match job {
                Job::Deliver(item) => item,
                Job::Shutdown => break,
            };

            if !self.gate.is_primary() {
                debug!(kind = %self.kind, receiver = %item.receiver, lid = %item.lid, "not primary, dropping callback");
                self.counters.dropped.fetch_add(1, Ordering::SeqCst);
                continue;
            }

            let result = match self.kind {
                CallbackKind::Revoke => self.callbacks.revoke(&item.receiver, item.lid, item.xid),
                CallbackKind::Retry => self.callbacks.retry(&item.receiver, item.lid, item.xid),
            };

            match result {
                Ok(LockStatus::Ok) => {
                    debug!(kind = %self.kind, receiver = %item.receiver, lid = %item.lid, "callback delivered");
                    self.counters.delivered.fetch_add(1, Ordering::SeqCst);
                }
                other => {
                    warn!(
                        kind = %self.kind,
                        receiver = %item.receiver,
                        lid = %item.lid,
                        result = ?other,
                        "callback not delivered, requeueing"
                    );
                    self.counters.requeued.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(self.backoff);
                    if self.requeue.send(Job::Deliver(item)).is_err() {
                        break;
                    }
                }
            }
        }
    }
}
