//! # rlock-core
//!
//! A caching distributed lock service. Clients cache granted locks and
//! serve repeated local acquires without contacting the server; the server
//! revokes a cached lock only when another client asks for it. A replicated
//! server variant deduplicates retransmitted requests and can move its whole
//! state between replicas.

pub mod client;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod infrastructure;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
#[cfg(feature = "sqlite")]
#[path = "infrastructure_sqlite.rs"]
pub mod infrastructure_sqlite;
pub mod local_table;
pub mod replica;
pub mod replicated;
pub mod server;
pub mod server_table;
pub mod snapshot;
pub mod transport;
pub mod types;

pub use client::{CachingLockClient, LockGuard, ReleaseHook};
pub use error::{ClientError, StateError, StoreError, TransportError};
pub use replica::{LocalReplica, PrimaryGate, Replica, StateTransfer};
pub use replicated::ReplicatedLockServer;
pub use server::CachingLockServer;
pub use transport::{CallbackConnector, LocalNetwork, LockCallback, LockService};
pub use types::{ClientId, LockId, LockStatus, Xid};

#[cfg(test)]
mod local_table_test;
#[cfg(test)]
mod server_table_test;
#[cfg(test)]
mod dispatch_test;
#[cfg(test)]
#[path = "infrastructure_test.rs"]
mod infrastructure_test;
