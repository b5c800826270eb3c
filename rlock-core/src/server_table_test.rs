#[cfg(test)]
mod tests {
    use crate::server_table::{ServerLock, ServerLockTable};
    use crate::types::{ClientId, LockId};

    fn client(name: &str) -> ClientId {
        ClientId::new(name)
    }

    #[test]
    fn test_unowned_lock_is_grantable_to_anyone() {
        let mut table = ServerLockTable::new();
        let lock = table.entry(LockId(1));
        assert!(lock.grantable_to(&client("a")));
        assert!(lock.owner().is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_owner_is_regranted_others_queue() {
        let mut lock = ServerLock::default();
        lock.grant(&client("a"));

        assert!(lock.grantable_to(&client("a")));
        assert!(!lock.grantable_to(&client("b")));

        assert!(lock.enqueue(&client("b")));
        assert!(!lock.enqueue(&client("b")), "a client is queued at most once");
        assert!(lock.enqueue(&client("c")));
        assert_eq!(lock.waiters().cloned().collect::<Vec<_>>(), vec![client("b"), client("c")]);
    }

    #[test]
    fn test_release_hands_lock_to_head() {
        let mut lock = ServerLock::default();
        lock.grant(&client("a"));
        lock.enqueue(&client("b"));
        lock.enqueue(&client("c"));

        assert_eq!(lock.release(), Some(client("b")));
        assert!(lock.is_owned_by(&client("b")));
        assert!(!lock.is_waiting(&client("b")));
        assert!(lock.is_head(&client("c")));

        assert_eq!(lock.release(), Some(client("c")));
        assert_eq!(lock.release(), None);
        assert!(lock.owner().is_none());
        assert!(!lock.has_waiters());
    }

    #[test]
    fn test_unowned_lock_reserved_for_queue_head() {
        let mut lock = ServerLock::default();
        lock.enqueue(&client("b"));
        lock.enqueue(&client("c"));

        assert!(!lock.grantable_to(&client("c")));
        assert!(!lock.grantable_to(&client("d")));
        assert!(lock.grantable_to(&client("b")));

        lock.grant(&client("b"));
        assert!(lock.is_owned_by(&client("b")));
        assert!(lock.is_head(&client("c")));
    }

    #[test]
    fn test_from_parts_rejects_duplicate_waiter() {
        let rebuilt = ServerLock::from_parts(Some(client("a")), vec![client("b"), client("c")])
            .expect("valid queue");
        assert!(rebuilt.is_waiting(&client("c")));
        assert!(rebuilt.is_head(&client("b")));

        let err = ServerLock::from_parts(None, vec![client("b"), client("b")]).unwrap_err();
        assert_eq!(err, client("b"));
    }

    #[test]
    fn test_table_iterates_in_lock_order() {
        let mut table = ServerLockTable::new();
        table.entry(LockId(9)).grant(&client("a"));
        table.entry(LockId(2)).grant(&client("b"));

        let lids: Vec<_> = table.iter().map(|(lid, _)| lid).collect();
        assert_eq!(lids, vec![LockId(2), LockId(9)]);
        assert_eq!(table.owner(LockId(9)), Some(&client("a")));
        assert_eq!(table.owner(LockId(3)), None);
    }
}
