//! Interface to the replicated-state-machine layer.
//!
//! Consensus, log replication and request routing live outside this crate.
//! The lock server only needs to know whether its replica is currently the
//! primary, and to hand the RSM a handler that can serialize and restore its
//! state when a replica joins or takes over.

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::info;

use crate::error::StateError;

pub trait PrimaryGate: Send + Sync {
    fn is_primary(&self) -> bool;
}

/// Gate for deployments without replication.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysPrimary;

impl PrimaryGate for AlwaysPrimary {
    fn is_primary(&self) -> bool {
        true
    }
}

/// State snapshot hooks a service registers with its replica.
pub trait StateTransfer: Send + Sync {
    fn serialize_state(&self) -> Result<Vec<u8>, StateError>;

    fn restore_state(&self, state: &[u8]) -> Result<(), StateError>;

    /// Called after the replica becomes primary.
    fn on_promoted(&self) {}
}

pub trait Replica: PrimaryGate {
    fn register_state_transfer(&self, handler: Arc<dyn StateTransfer>);
}

/// A single replica whose role is set by hand.
///
/// Stands in for the RSM in tests and in the CLI, where an operator (or an
/// external supervisor) moves state between processes and promotes the
/// standby.
///
/// The registered handler is held weakly; the service owns the replica gate,
/// not the other way round.
pub struct LocalReplica {
    primary: AtomicBool,
    handler: Mutex<Option<Weak<dyn StateTransfer>>>,
}

impl LocalReplica {
    pub fn new(primary: bool) -> Self {
        Self {
            primary: AtomicBool::new(primary),
            handler: Mutex::new(None),
        }
    }

    fn handler(&self) -> Result<Arc<dyn StateTransfer>, StateError> {
        self.handler
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(StateError::NoHandler)
    }

    pub fn promote(&self) {
        if self.primary.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("replica promoted to primary");
        if let Ok(handler) = self.handler() {
            handler.on_promoted();
        }
    }

    pub fn demote(&self) {
        if self.primary.swap(false, Ordering::SeqCst) {
            info!("replica demoted to backup");
        }
    }

    pub fn snapshot(&self) -> Result<Vec<u8>, StateError> {
        self.handler()?.serialize_state()
    }

    pub fn restore(&self, state: &[u8]) -> Result<(), StateError> {
        self.handler()?.restore_state(state)
    }

    /// Copy this replica's state into `other`.
    pub fn transfer_to(&self, other: &LocalReplica) -> Result<(), StateError> {
        let state = self.snapshot()?;
        other.restore(&state)
    }
}

impl PrimaryGate for LocalReplica {
    fn is_primary(&self) -> bool {
        self.primary.load(Ordering::SeqCst)
    }
}

impl Replica for LocalReplica {
    fn register_state_transfer(&self, handler: Arc<dyn StateTransfer>) {
        *self.handler.lock() = Some(Arc::downgrade(&handler));
    }
}
