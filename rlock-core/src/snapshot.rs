//! Serialized form of the replicated server's state.
//!
//! Only the owner map, wait queues and dedup records travel. Pending
//! revoke/retry work is recomputed by the receiving replica instead.

use serde::{Deserialize, Serialize};

use crate::dedup::DedupTable;
use crate::error::StateError;
use crate::server_table::{ServerLock, ServerLockTable};
use crate::types::{ClientId, LockId, LockStatus, Xid};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSnapshot {
    pub lid: LockId,
    pub owner: Option<ClientId>,
    /// Wait queue, head first
    pub queue: Vec<ClientId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub lid: LockId,
    pub client: ClientId,
    pub xid: Xid,
    pub response: LockStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub version: u32,
    pub locks: Vec<LockSnapshot>,
    pub requests: Vec<RequestSnapshot>,
}

impl ServerSnapshot {
    pub fn capture(table: &ServerLockTable, requests: &DedupTable) -> Self {
        let locks = table
            .iter()
            .map(|(lid, lock)| LockSnapshot {
                lid,
                owner: lock.owner().cloned(),
                queue: lock.waiters().cloned().collect(),
            })
            .collect();
        let requests = requests
            .iter()
            .map(|(lid, client, record)| RequestSnapshot {
                lid,
                client: client.clone(),
                xid: record.last_xid,
                response: record.response,
            })
            .collect();
        Self {
            version: SNAPSHOT_VERSION,
            locks,
            requests,
        }
    }

    /// Rebuild the in-memory tables, including the queue membership index.
    pub fn into_state(self) -> Result<(ServerLockTable, DedupTable), StateError> {
        let mut table = ServerLockTable::new();
        for lock in self.locks {
            let lid = lock.lid;
            let rebuilt = ServerLock::from_parts(lock.owner, lock.queue)
                .map_err(|client| StateError::DuplicateWaiter { lid, client })?;
            table.insert(lid, rebuilt);
        }

        let mut requests = DedupTable::new();
        for request in self.requests {
            requests.record(request.lid, &request.client, request.xid, request.response);
        }
        Ok((table, requests))
    }

    pub fn encode(&self) -> Result<Vec<u8>, StateError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StateError> {
        let snapshot: ServerSnapshot = serde_json::from_slice(bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StateError::UnsupportedVersion(snapshot.version));
        }
        Ok(snapshot)
    }
}
