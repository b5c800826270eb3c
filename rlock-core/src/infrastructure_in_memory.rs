use crate::error::StoreError;
use crate::infrastructure::SnapshotStore;

/// Keeps the latest snapshot in process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    latest: Option<Vec<u8>>,
    checkpoints: u64,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn save(&mut self, snapshot: &[u8]) -> Result<(), StoreError> {
        self.latest = Some(snapshot.to_vec());
        self.checkpoints += 1;
        Ok(())
    }

    fn load(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.latest.clone())
    }

    fn checkpoints(&self) -> u64 {
        self.checkpoints
    }
}
