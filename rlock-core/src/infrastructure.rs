use crate::error::StoreError;

/// Durable home for encoded server snapshots.
///
/// A store only ever needs the newest snapshot back. Backends are free to
/// discard older ones as soon as a newer save succeeds.
pub trait SnapshotStore: Send {
    /// Persist `snapshot` as the latest checkpoint.
    fn save(&mut self, snapshot: &[u8]) -> Result<(), StoreError>;

    /// The most recently saved snapshot, if any.
    fn load(&self) -> Result<Option<Vec<u8>>, StoreError>;

    /// Number of checkpoints written over the store's lifetime
    fn checkpoints(&self) -> u64;
}
