//! Per-(lock, client) request deduplication for the replicated server.
//!
//! Retransmissions across a failover reuse the original xid. Remembering
//! the last xid and the reply given to it lets the server answer a replay
//! without running the request again.

use std::collections::BTreeMap;

use crate::types::{ClientId, LockId, LockStatus, Xid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupRecord {
    pub last_xid: Xid,
    pub response: LockStatus,
}

#[derive(Debug, Default, Clone)]
pub struct DedupTable {
    records: BTreeMap<LockId, BTreeMap<ClientId, DedupRecord>>,
}

impl DedupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded reply if `xid` is not newer than the last request seen
    /// from `client` for `lid`.
    pub fn replay(&self, lid: LockId, client: &ClientId, xid: Xid) -> Option<LockStatus> {
        self.get(lid, client)
            .filter(|record| xid <= record.last_xid)
            .map(|record| record.response)
    }

    /// Remember the reply to a freshly executed request.
    pub fn record(&mut self, lid: LockId, client: &ClientId, xid: Xid, response: LockStatus) {
        self.records.entry(lid).or_default().insert(
            client.clone(),
            DedupRecord {
                last_xid: xid,
                response,
            },
        );
    }

    pub fn last_xid(&self, lid: LockId, client: &ClientId) -> Option<Xid> {
        self.get(lid, client).map(|record| record.last_xid)
    }

    pub fn get(&self, lid: LockId, client: &ClientId) -> Option<DedupRecord> {
        self.records.get(&lid)?.get(client).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LockId, &ClientId, DedupRecord)> {
        self.records.iter().flat_map(|(lid, clients)| {
            clients
                .iter()
                .map(move |(client, record)| (*lid, client, *record))
        })
    }
}
