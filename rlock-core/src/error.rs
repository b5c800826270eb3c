use thiserror::Error;

use crate::types::{ClientId, LockId, LockStatus};

/// Failure to deliver a call to a remote endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No handle could be bound to the endpoint.
    #[error("endpoint '{0}' is unreachable")]
    Unreachable(String),

    /// The call was sent but did not complete.
    #[error("rpc to '{endpoint}' failed: {reason}")]
    Rpc { endpoint: String, reason: String },

    /// The peer answered with something that is not a lock reply.
    #[error("malformed reply from '{endpoint}': {reason}")]
    BadReply { endpoint: String, reason: String },
}

impl TransportError {
    pub fn unreachable(endpoint: impl Into<String>) -> Self {
        TransportError::Unreachable(endpoint.into())
    }

    pub fn rpc(endpoint: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        TransportError::Rpc {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors returned to local callers of [`CachingLockClient`](crate::client::CachingLockClient).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered an acquire with a status the client cannot wait on.
    #[error("server answered {status} for lock {lid}")]
    Server { lid: LockId, status: LockStatus },

    /// `release` was called for a lock this process does not hold.
    #[error("lock {0} is not held by this client")]
    NotHeld(LockId),
}

/// Errors raised while moving server state between replicas.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("snapshot codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    #[error("no state transfer handler registered")]
    NoHandler,

    #[error("snapshot lists client '{client}' twice in the queue of lock {lid}")]
    DuplicateWaiter { lid: LockId, client: ClientId },
}

/// Errors raised by a [`SnapshotStore`](crate::infrastructure::SnapshotStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("snapshot store error: {0}")]
    Backend(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
