#[cfg(test)]
mod tests {
    use crate::local_table::{Admission, LocalLockTable, LocalState, RevokeStep};
    use crate::types::LockId;

    const LID: LockId = LockId(5);

    #[test]
    fn test_unknown_lock_starts_in_none() {
        let table = LocalLockTable::new();
        assert_eq!(table.state(LID), LocalState::None);
        assert!(table.get(LID).is_none());
    }

    #[test]
    fn test_head_goes_remote_then_others_wait() {
        let mut table = LocalLockTable::new();
        let first = table.enqueue(LID);
        let second = table.enqueue(LID);

        assert_eq!(table.admit(LID, second), Admission::Wait);
        assert_eq!(table.admit(LID, first), Admission::Remote);
        assert_eq!(table.state(LID), LocalState::Acquiring);

        table.record_xid(LID, 1);
        table.granted(LID);
        assert_eq!(table.state(LID), LocalState::Locked);
        // Still not the second caller's turn
        assert_eq!(table.admit(LID, second), Admission::Wait);
    }

    #[test]
    fn test_cached_token_passes_in_fifo_order() {
        let mut table = LocalLockTable::new();
        let first = table.enqueue(LID);
        let second = table.enqueue(LID);
        let third = table.enqueue(LID);

        assert_eq!(table.admit(LID, first), Admission::Remote);
        table.record_xid(LID, 1);
        table.granted(LID);

        assert!(table.release(LID));
        assert_eq!(table.state(LID), LocalState::Free);
        assert_eq!(table.admit(LID, third), Admission::Wait);
        assert_eq!(table.admit(LID, second), Admission::Granted);

        assert!(table.release(LID));
        assert_eq!(table.admit(LID, third), Admission::Granted);
        assert!(table.release(LID));
        assert_eq!(table.get(LID).map(|l| l.queue_len()), Some(0));
    }

    #[test]
    fn test_release_without_holder_is_rejected() {
        let mut table = LocalLockTable::new();
        assert!(!table.release(LID));

        table.enqueue(LID);
        // ACQUIRING is not held yet
        let ticket = table.enqueue(LockId(6));
        assert_eq!(table.admit(LockId(6), ticket), Admission::Remote);
        assert!(!table.release(LockId(6)));
    }

    #[test]
    fn test_retry_signal_is_consumed_once() {
        let mut table = LocalLockTable::new();
        let ticket = table.enqueue(LID);
        assert_eq!(table.admit(LID, ticket), Admission::Remote);

        assert!(!table.take_retry(LID));
        table.signal_retry(LID);
        assert!(table.get(LID).is_some_and(|l| l.retry_pending()));
        assert!(table.take_retry(LID));
        assert!(!table.take_retry(LID));
    }

    #[test]
    fn test_admission_clears_stale_retry() {
        let mut table = LocalLockTable::new();
        table.signal_retry(LID);
        let ticket = table.enqueue(LID);
        assert_eq!(table.admit(LID, ticket), Admission::Remote);
        assert!(!table.take_retry(LID));
    }

    #[test]
    fn test_abandon_hands_turn_to_next_caller() {
        let mut table = LocalLockTable::new();
        let first = table.enqueue(LID);
        let second = table.enqueue(LID);
        assert_eq!(table.admit(LID, first), Admission::Remote);

        table.abandon(LID, first);
        assert_eq!(table.state(LID), LocalState::None);
        assert_eq!(table.admit(LID, second), Admission::Remote);
    }

    #[test]
    fn test_revoke_waits_for_local_queue() {
        let mut table = LocalLockTable::new();
        let first = table.enqueue(LID);
        table.admit(LID, first);
        table.record_xid(LID, 7);
        table.granted(LID);

        assert_eq!(table.begin_revoke(LID, 0), RevokeStep::Wait);

        table.release(LID);
        assert_eq!(table.begin_revoke(LID, 0), RevokeStep::Release { xid: 7 });
        assert_eq!(table.state(LID), LocalState::Releasing);
        // A second revoke waits for the first to finish
        assert_eq!(table.begin_revoke(LID, 0), RevokeStep::Wait);
    }

    #[test]
    fn test_finish_revoke_outcomes() {
        let mut table = LocalLockTable::new();
        let ticket = table.enqueue(LID);
        table.admit(LID, ticket);
        table.record_xid(LID, 3);
        table.granted(LID);
        table.release(LID);

        assert_eq!(table.begin_revoke(LID, 0), RevokeStep::Release { xid: 3 });
        table.finish_revoke(LID, false);
        assert_eq!(table.state(LID), LocalState::Free);

        assert_eq!(table.begin_revoke(LID, 0), RevokeStep::Release { xid: 3 });
        table.finish_revoke(LID, true);
        assert_eq!(table.state(LID), LocalState::None);
        assert_eq!(table.get(LID).map(|l| l.last_xid()), Some(3));
    }

    #[test]
    fn test_revoke_of_unowned_lock() {
        let mut table = LocalLockTable::new();
        assert_eq!(table.begin_revoke(LID, 0), RevokeStep::NotOwned { xid: 0 });
        assert_eq!(table.state(LID), LocalState::None);
    }

    #[test]
    fn test_revoke_for_older_grant_is_stale() {
        let mut table = LocalLockTable::new();
        let ticket = table.enqueue(LID);
        table.admit(LID, ticket);
        table.record_xid(LID, 6);

        // Acquire in flight with xid 6; a revoke for the grant at xid 4 is old news
        assert_eq!(table.begin_revoke(LID, 4), RevokeStep::Stale);
        assert_eq!(table.begin_revoke(LID, 6), RevokeStep::Wait);
        assert_eq!(table.state(LID), LocalState::Acquiring);
    }

    #[test]
    #[should_panic(expected = "illegal transition")]
    fn test_grant_outside_acquiring_panics() {
        let mut table = LocalLockTable::new();
        table.granted(LID);
    }
}
